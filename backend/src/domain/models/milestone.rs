use rust_decimal::Decimal;
use shared::{MilestoneData, MilestoneItem};

/// A milestone the user wants to add
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneCandidate {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub items: Vec<MilestoneItem>,
}

/// Partial update of an existing milestone; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilestoneChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub items: Option<Vec<MilestoneItem>>,
}

/// An approved milestone, trimmed and rounded
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMilestone {
    /// Set when the proposal updates an existing milestone
    pub id: Option<String>,
    pub phase_id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub items: Vec<MilestoneItem>,
    /// Phase goal minus every milestone including this one
    pub remaining_budget: Decimal,
}

impl NormalizedMilestone {
    pub fn to_milestone_data(&self) -> MilestoneData {
        MilestoneData {
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price,
            items: self.items.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneRemovalPlan {
    pub milestone_id: String,
    pub remaining_total: Decimal,
    pub remaining_budget: Decimal,
}
