//! Render request assembly from stored quote data.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{QuotesRepo, RepoError};
use crate::domain::entities::{DiscountType, QuoteDocument};
use crate::domain::error::DomainError;

pub const DEFAULT_TEMPLATE: &str = "budget-premium";
const DEFAULT_MARGIN: &str = "1cm";

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("quote `{0}` not found")]
    QuoteNotFound(Uuid),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("quote data cannot be rendered: {0}")]
    InvalidData(#[from] DomainError),
}

/// Body posted to the render service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPayload {
    #[serde(rename = "type")]
    pub template: String,
    pub title: String,
    pub data: QuotePdfData,
    pub config: PageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageConfig {
    pub format: &'static str,
    pub orientation: &'static str,
    pub margin: PageMargin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMargin {
    pub top: &'static str,
    pub right: &'static str,
    pub bottom: &'static str,
    pub left: &'static str,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            format: "A4",
            orientation: "portrait",
            margin: PageMargin {
                top: DEFAULT_MARGIN,
                right: DEFAULT_MARGIN,
                bottom: DEFAULT_MARGIN,
                left: DEFAULT_MARGIN,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotePdfData {
    pub company: CompanyBlock,
    pub client: ClientBlock,
    pub quote: QuoteBlock,
    pub items: Vec<ItemLine>,
    pub totals: Totals,
    pub notes: Option<String>,
    pub terms: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyBlock {
    pub name: String,
    pub logo_url: Option<String>,
    pub document_number: Option<String>,
    pub document_type: Option<String>,
    pub address: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientBlock {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteBlock {
    pub number: String,
    pub status: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub discount_type: Option<DiscountType>,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
}

#[derive(Clone)]
pub struct PayloadBuilder {
    quotes: Arc<dyn QuotesRepo>,
    template: String,
}

impl PayloadBuilder {
    pub fn new(quotes: Arc<dyn QuotesRepo>) -> Self {
        Self {
            quotes,
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub async fn build(&self, quote_id: Uuid) -> Result<RenderPayload, PayloadError> {
        let document = self
            .quotes
            .load_quote_document(quote_id)
            .await?
            .ok_or(PayloadError::QuoteNotFound(quote_id))?;

        compose(&self.template, &document)
    }
}

pub fn compose(template: &str, document: &QuoteDocument) -> Result<RenderPayload, PayloadError> {
    let QuoteDocument {
        quote,
        company,
        client,
        items,
    } = document;

    let mut lines: Vec<_> = items.iter().collect();
    lines.sort_by_key(|item| item.position);

    let items = lines
        .into_iter()
        .map(|item| {
            Ok(ItemLine {
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.to_units()?,
                total: item.total_price.to_units()?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    Ok(RenderPayload {
        template: template.to_string(),
        title: format!("Orçamento {}", quote.quote_number),
        data: QuotePdfData {
            company: CompanyBlock {
                name: company.name.clone(),
                logo_url: company.logo_url.clone(),
                document_number: company.document_number.clone(),
                document_type: company.document_type.clone(),
                address: company.address.formatted(),
                email: company.email.clone(),
                phone: company.phone.clone(),
                website: company.website.clone(),
            },
            client: ClientBlock {
                name: client.name.clone(),
                email: client.email.clone(),
                phone: client.phone_number.clone(),
                document_number: client.document_number.clone(),
            },
            quote: QuoteBlock {
                number: quote.quote_number.clone(),
                status: quote.status.clone(),
                issue_date: quote.issue_date.to_string(),
                expiry_date: quote.expiry_date.map(|date| date.to_string()),
                currency: quote.currency.clone(),
            },
            items,
            totals: Totals {
                subtotal: quote.subtotal.to_units()?,
                discount_type: quote.discount_type,
                discount: quote.discount_value.to_units()?,
                tax: quote.tax_amount.to_units()?,
                total: quote.total_amount.to_units()?,
            },
            notes: quote.notes.clone(),
            terms: quote.terms_and_conditions.clone(),
        },
        config: PageConfig::default(),
    })
}
