use async_trait::async_trait;
use time::Date;
use uuid::Uuid;

use crate::{
    application::repos::{QuotesRepo, RepoError},
    domain::{
        entities::{
            ClientRecord, CompanyRecord, DiscountType, PostalAddress, QuoteDocument,
            QuoteItemRecord, QuoteRecord,
        },
        money::Cents,
    },
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct QuoteRow {
    id: Uuid,
    company_id: Uuid,
    client_id: Uuid,
    quote_number: String,
    status: String,
    issue_date: Date,
    expiry_date: Option<Date>,
    notes: Option<String>,
    terms_and_conditions_content: Option<String>,
    subtotal_cents: i64,
    discount_type: Option<String>,
    discount_value_cents: i64,
    tax_amount_cents: i64,
    total_amount_cents: i64,
    currency: String,
    company_name: String,
    company_document_number: Option<String>,
    company_document_type: Option<String>,
    company_email: Option<String>,
    company_phone: Option<String>,
    company_website: Option<String>,
    company_logo_url: Option<String>,
    address_street: Option<String>,
    address_number: Option<String>,
    address_complement: Option<String>,
    address_neighborhood: Option<String>,
    address_city: Option<String>,
    address_state: Option<String>,
    address_zip_code: Option<String>,
    client_name: String,
    client_email: Option<String>,
    client_phone_number: Option<String>,
    client_document_number: Option<String>,
}

#[derive(sqlx::FromRow)]
struct QuoteItemRow {
    id: Uuid,
    position: i32,
    description: String,
    quantity: i32,
    unit_price_cents: i64,
    total_price_cents: i64,
}

impl QuoteRow {
    fn into_document(self, items: Vec<QuoteItemRecord>) -> Result<QuoteDocument, RepoError> {
        let discount_type = match self.discount_type.as_deref() {
            None => None,
            Some(raw) => Some(DiscountType::parse(raw).ok_or_else(|| {
                RepoError::from_persistence(format!("unknown discount type `{raw}`"))
            })?),
        };

        Ok(QuoteDocument {
            quote: QuoteRecord {
                id: self.id,
                company_id: self.company_id,
                client_id: self.client_id,
                quote_number: self.quote_number,
                status: self.status,
                issue_date: self.issue_date,
                expiry_date: self.expiry_date,
                notes: self.notes,
                terms_and_conditions: self.terms_and_conditions_content,
                subtotal: Cents(self.subtotal_cents),
                discount_type,
                discount_value: Cents(self.discount_value_cents),
                tax_amount: Cents(self.tax_amount_cents),
                total_amount: Cents(self.total_amount_cents),
                currency: self.currency,
            },
            company: CompanyRecord {
                id: self.company_id,
                name: self.company_name,
                document_number: self.company_document_number,
                document_type: self.company_document_type,
                email: self.company_email,
                phone: self.company_phone,
                website: self.company_website,
                logo_url: self.company_logo_url,
                address: PostalAddress {
                    street: self.address_street,
                    number: self.address_number,
                    complement: self.address_complement,
                    neighborhood: self.address_neighborhood,
                    city: self.address_city,
                    state: self.address_state,
                    zip_code: self.address_zip_code,
                },
            },
            client: ClientRecord {
                id: self.client_id,
                name: self.client_name,
                email: self.client_email,
                phone_number: self.client_phone_number,
                document_number: self.client_document_number,
            },
            items,
        })
    }
}

#[async_trait]
impl QuotesRepo for PostgresRepositories {
    async fn load_quote_document(
        &self,
        quote_id: Uuid,
    ) -> Result<Option<QuoteDocument>, RepoError> {
        let quote = sqlx::query_as::<_, QuoteRow>(
            r#"
            SELECT q.id,
                   q.company_id,
                   q.client_id,
                   q.quote_number,
                   q.status,
                   q.issue_date,
                   q.expiry_date,
                   q.notes,
                   q.terms_and_conditions_content,
                   q.subtotal_cents,
                   q.discount_type,
                   q.discount_value_cents,
                   q.tax_amount_cents,
                   q.total_amount_cents,
                   q.currency,
                   co.name AS company_name,
                   co.document_number AS company_document_number,
                   co.document_type AS company_document_type,
                   co.email AS company_email,
                   co.phone AS company_phone,
                   co.website AS company_website,
                   co.logo_url AS company_logo_url,
                   co.address_street,
                   co.address_number,
                   co.address_complement,
                   co.address_neighborhood,
                   co.address_city,
                   co.address_state,
                   co.address_zip_code,
                   cl.name AS client_name,
                   cl.email AS client_email,
                   cl.phone_number AS client_phone_number,
                   cl.document_number AS client_document_number
              FROM quotes q
              JOIN companies co ON co.id = q.company_id
              JOIN clients cl ON cl.id = q.client_id
             WHERE q.id = $1
            "#,
        )
        .bind(quote_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(quote) = quote else {
            return Ok(None);
        };

        // Items without their own description fall back to the product name.
        let items = sqlx::query_as::<_, QuoteItemRow>(
            r#"
            SELECT qi.id,
                   qi.position,
                   COALESCE(NULLIF(qi.description, ''), p.name, '') AS description,
                   qi.quantity,
                   qi.unit_price_cents,
                   qi.total_price_cents
              FROM quote_items qi
              LEFT JOIN products p ON p.id = qi.product_id
             WHERE qi.quote_id = $1
             ORDER BY qi.position, qi.id
            "#,
        )
        .bind(quote_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .into_iter()
        .map(|row| QuoteItemRecord {
            id: row.id,
            position: row.position,
            description: row.description,
            quantity: row.quantity,
            unit_price: Cents(row.unit_price_cents),
            total_price: Cents(row.total_price_cents),
        })
        .collect();

        quote.into_document(items).map(Some)
    }
}
