//! Domain entities mirrored from persistent storage.

use quotepdf_api_types::PdfJob;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::{error::DomainError, money::Cents, types::PdfJobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfJobRecord {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub status: PdfJobStatus,
    pub artifact_ref: Option<String>,
    pub created_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PdfJobRecord {
    /// A stored artifact reference exists exactly when the job completed.
    pub fn check_artifact_invariant(&self) -> Result<(), DomainError> {
        let completed = self.status == PdfJobStatus::Completed;
        if completed != self.artifact_ref.is_some() {
            return Err(DomainError::invariant(format!(
                "job {} is `{}` with artifact reference {}",
                self.id,
                self.status,
                if self.artifact_ref.is_some() {
                    "present"
                } else {
                    "absent"
                }
            )));
        }
        Ok(())
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.created_by.as_deref() == Some(owner)
    }
}

impl From<PdfJobRecord> for PdfJob {
    fn from(record: PdfJobRecord) -> Self {
        Self {
            id: record.id,
            quote_id: record.quote_id,
            status: record.status,
            s3_key: record.artifact_ref,
            created_by: record.created_by,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

impl PostalAddress {
    /// Present fields joined by `", "`; blank fields count as absent.
    pub fn formatted(&self) -> String {
        [
            &self.street,
            &self.number,
            &self.neighborhood,
            &self.city,
            &self.state,
            &self.zip_code,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref().map(str::trim))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRecord {
    pub id: Uuid,
    pub name: String,
    pub document_number: Option<String>,
    pub document_type: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub address: PostalAddress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub document_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
}

impl DiscountType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "percentage" => Some(DiscountType::Percentage),
            "fixed_amount" => Some(DiscountType::FixedAmount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub quote_number: String,
    pub status: String,
    pub issue_date: Date,
    pub expiry_date: Option<Date>,
    pub notes: Option<String>,
    pub terms_and_conditions: Option<String>,
    pub subtotal: Cents,
    pub discount_type: Option<DiscountType>,
    /// Resolved discount amount, already applied to `total`.
    pub discount_value: Cents,
    pub tax_amount: Cents,
    pub total_amount: Cents,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteItemRecord {
    pub id: Uuid,
    pub position: i32,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Cents,
    pub total_price: Cents,
}

/// Everything the payload builder needs to describe one quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteDocument {
    pub quote: QuoteRecord,
    pub company: CompanyRecord,
    pub client: ClientRecord,
    pub items: Vec<QuoteItemRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub principal: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}
