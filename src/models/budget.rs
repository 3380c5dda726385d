use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetWorkspace {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
    #[schema(example = "EUR")]
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for BudgetWorkspace {
    fn entity_type() -> &'static str { "workspace" }
    fn subject_id(&self) -> Uuid { self.id }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// Percent, 0..=100.
    pub vat_rate: f64,
    pub created_at: DateTime<Utc>,
}

impl Loggable for BudgetLine {
    fn entity_type() -> &'static str { "budget_line" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Noise }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BudgetSummary {
    pub subtotal: f64,
    pub vat: f64,
    pub total: f64,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl BudgetSummary {
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a BudgetLine>) -> Self {
        let (subtotal, vat) = lines.into_iter().fold((0.0, 0.0), |(net, vat), line| {
            let amount = line.quantity * line.unit_price;
            (net + amount, vat + amount * line.vat_rate / 100.0)
        });

        let subtotal = round_cents(subtotal);
        let vat = round_cents(vat);
        BudgetSummary {
            subtotal,
            vat,
            total: round_cents(subtotal + vat),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceDetail {
    pub workspace: BudgetWorkspace,
    pub member_ids: Vec<Uuid>,
    pub lines: Vec<BudgetLine>,
    pub summary: BudgetSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceOverview {
    pub workspace: BudgetWorkspace,
    pub summary: BudgetSummary,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCreateRequest {
    #[schema(example = "Phase 1 materials")]
    pub name: String,
    pub project_id: Option<Uuid>,
    #[schema(example = "EUR")]
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLineRequest {
    #[schema(example = "Concrete, m3")]
    pub description: String,
    #[schema(example = 12.5)]
    pub quantity: f64,
    #[schema(example = 95.0)]
    pub unit_price: f64,
    #[serde(default)]
    #[schema(example = 21.0)]
    pub vat_rate: f64,
}

impl BudgetLineRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.description.trim().is_empty() {
            return Err(AppError::bad_request("description must not be empty"));
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(AppError::bad_request("quantity must be a non-negative number"));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(AppError::bad_request("unitPrice must be a non-negative number"));
        }
        if !(0.0..=100.0).contains(&self.vat_rate) {
            return Err(AppError::bad_request("vatRate must be between 0 and 100"));
        }
        Ok(())
    }
}
