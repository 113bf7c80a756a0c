use crate::{
    db::DbPool,
    entities::{invoice_sequence, order, product, product_variant},
    errors::ServiceError,
    tracing::with_metrics,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

const PRODUCT_NAME_MAX: usize = 32;

/// `INV-2026-0001`
pub fn format_invoice_number(year: i32, sequence: i32) -> String {
    format!("INV-{}-{:04}", year, sequence)
}

/// Issues the next invoice number for `year`.
///
/// Must run inside the transaction that stores the number on the order: the
/// row-level increment serializes concurrent issuers and a rollback returns
/// the number to the sequence.
pub async fn allocate_invoice_number<C: ConnectionTrait>(
    conn: &C,
    year: i32,
) -> Result<String, ServiceError> {
    if !increment_sequence(conn, year).await? {
        let seed = invoice_sequence::ActiveModel {
            year: Set(year),
            last_value: Set(0),
        };
        match invoice_sequence::Entity::insert(seed)
            .on_conflict(
                OnConflict::column(invoice_sequence::Column::Year)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await
        {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        if !increment_sequence(conn, year).await? {
            return Err(ServiceError::InternalError(format!(
                "invoice sequence for {} could not be created",
                year
            )));
        }
    }

    let row = invoice_sequence::Entity::find_by_id(year)
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError(format!("invoice sequence for {} disappeared", year))
        })?;

    Ok(format_invoice_number(year, row.last_value))
}

async fn increment_sequence<C: ConnectionTrait>(conn: &C, year: i32) -> Result<bool, ServiceError> {
    let result = invoice_sequence::Entity::update_many()
        .col_expr(
            invoice_sequence::Column::LastValue,
            Expr::col(invoice_sequence::Column::LastValue).add(1),
        )
        .filter(invoice_sequence::Column::Year.eq(year))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Everything printed on an invoice
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSnapshot {
    pub store_name: String,
    pub store_domain: String,
    pub invoice_number: Option<String>,
    pub order_id: Uuid,
    pub issued_on: DateTime<Utc>,
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub product_name: String,
    pub variant_label: Option<String>,
    pub is_customized: bool,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total_price: Decimal,
}

/// Renders a single-page A4 PDF 1.4 invoice. Pure and deterministic.
pub fn render_invoice(snapshot: &InvoiceSnapshot) -> Result<Vec<u8>, ServiceError> {
    let invoice_number = snapshot.invoice_number.as_deref().ok_or_else(|| {
        ServiceError::PreconditionFailed(
            "Invoice not available until payment is confirmed".to_string(),
        )
    })?;

    let mut page = PageContent::default();

    page.text(&snapshot.store_name, 50, 800, 20, true);
    page.text(&snapshot.store_domain, 50, 778, 10, false);
    page.text("INVOICE", 400, 808, 14, true);
    page.text(&format!("Invoice #: {}", invoice_number), 370, 793, 9, false);
    page.text(&format!("Order ID:  {}", snapshot.order_id), 370, 780, 9, false);
    page.text(
        &format!("Date:      {}", snapshot.issued_on.format("%d %b %Y")),
        370,
        767,
        9,
        false,
    );
    page.rule(758);

    page.text("BILL TO", 50, 742, 9, true);
    page.text(&snapshot.customer_name, 50, 727, 11, false);
    page.text(&format!("Phone: {}", snapshot.phone), 50, 712, 9, false);
    if let Some(email) = &snapshot.email {
        page.text(&format!("Email: {}", email), 50, 697, 9, false);
    }

    let table_top = if snapshot.email.is_some() { 680 } else { 695 };
    page.rule(table_top);

    let header_y = table_top - 16;
    page.text("Product", 50, header_y, 9, true);
    page.text("Type", 270, header_y, 9, true);
    page.text("Unit Price", 350, header_y, 9, true);
    page.text("Qty", 430, header_y, 9, true);
    page.text("Subtotal", 480, header_y, 9, true);
    page.rule(header_y - 9);

    let row_y = header_y - 23;
    let product = match &snapshot.variant_label {
        Some(label) => format!("{} ({})", snapshot.product_name, label),
        None => snapshot.product_name.clone(),
    };
    page.text(&truncate(&sanitize(&product), PRODUCT_NAME_MAX), 50, row_y, 9, false);
    page.text(
        if snapshot.is_customized {
            "Customized"
        } else {
            "Premade"
        },
        270,
        row_y,
        9,
        false,
    );
    page.text(&money(snapshot.unit_price), 350, row_y, 9, false);
    page.text(&snapshot.quantity.to_string(), 430, row_y, 9, false);
    page.text(
        &money(snapshot.unit_price * Decimal::from(snapshot.quantity)),
        480,
        row_y,
        9,
        false,
    );

    let summary_y = row_y - 14;
    page.rule(summary_y);
    let total_y = summary_y - 23;
    page.text("TOTAL:", 370, total_y, 12, true);
    page.text(&money(snapshot.total_price), 480, total_y, 12, true);

    page.rule(75);
    page.text(
        &format!(
            "Thank you for your order!  -  {}  |  {}",
            snapshot.store_name, snapshot.store_domain
        ),
        50,
        60,
        8,
        false,
    );

    Ok(assemble_pdf(&page.ops.join("\n")))
}

#[derive(Default)]
struct PageContent {
    ops: Vec<String>,
}

impl PageContent {
    fn text(&mut self, text: &str, x: i32, y: i32, size: u8, bold: bool) {
        self.ops.push(format!(
            "BT /{} {} Tf {} {} Td ({}) Tj ET",
            if bold { "F2" } else { "F1" },
            size,
            x,
            y,
            escape(text)
        ));
    }

    fn rule(&mut self, y: i32) {
        self.ops
            .push(format!("q 0.75 0.75 0.75 RG 50 {y} m 545 {y} l S Q", y = y));
    }
}

/// Printable ASCII only, so byte offsets equal character offsets.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect()
}

fn escape(raw: &str) -> String {
    sanitize(raw)
        .replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn truncate(raw: &str, max: usize) -> String {
    if raw.chars().count() > max {
        let head: String = raw.chars().take(max).collect();
        format!("{}...", head)
    } else {
        raw.to_string()
    }
}

fn money(amount: Decimal) -> String {
    format!("Rs. {:.2}", amount)
}

fn assemble_pdf(content: &str) -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        concat!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842]\n",
            "   /Contents 4 0 R\n",
            "   /Resources << /Font << /F1 5 0 R /F2 6 0 R >> >> >>"
        )
        .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        // Writing to a String cannot fail.
        let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
    }

    let xref_pos = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in &offsets {
        let _ = writeln!(out, "{:010} 00000 n ", offset);
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_pos
    );

    out.into_bytes()
}

#[derive(Debug, Clone)]
pub struct RenderedInvoice {
    pub invoice_number: String,
    pub bytes: Vec<u8>,
}

impl RenderedInvoice {
    pub fn filename(&self) -> String {
        format!("{}.pdf", self.invoice_number)
    }
}

/// Loads order data and renders invoices on demand; nothing is stored.
#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
    store_name: String,
    store_domain: String,
}

impl InvoiceService {
    pub fn new(
        db_pool: Arc<DbPool>,
        store_name: impl Into<String>,
        store_domain: impl Into<String>,
    ) -> Self {
        Self {
            db_pool,
            store_name: store_name.into(),
            store_domain: store_domain.into(),
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn invoice_for_order(&self, order_id: Uuid) -> Result<RenderedInvoice, ServiceError> {
        with_metrics("render_invoice", || async {
            let snapshot = self.snapshot(order_id).await?;
            let bytes = render_invoice(&snapshot)?;
            let invoice_number = snapshot.invoice_number.unwrap_or_default();
            info!(invoice_number = %invoice_number, size = bytes.len(), "Invoice rendered");
            Ok(RenderedInvoice {
                invoice_number,
                bytes,
            })
        })
        .await
    }

    async fn snapshot(&self, order_id: Uuid) -> Result<InvoiceSnapshot, ServiceError> {
        let db = &*self.db_pool;
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))?;

        let product_name = product::Entity::find_by_id(order.product_id)
            .one(db)
            .await?
            .map(|p| p.name)
            .unwrap_or_else(|| "Product".to_string());
        let variant_label = match order.variant_id {
            Some(variant_id) => product_variant::Entity::find()
                .filter(product_variant::Column::Id.eq(variant_id))
                .one(db)
                .await?
                .and_then(|v| v.label()),
            None => None,
        };

        Ok(InvoiceSnapshot {
            store_name: self.store_name.clone(),
            store_domain: self.store_domain.clone(),
            invoice_number: order.invoice_number,
            order_id: order.id,
            issued_on: order.invoiced_at.unwrap_or(order.created_at),
            customer_name: order.customer_name,
            phone: order.phone,
            email: order.email,
            product_name,
            variant_label,
            is_customized: order.is_customized,
            unit_price: order.unit_price,
            quantity: order.quantity,
            total_price: order.total_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn snapshot() -> InvoiceSnapshot {
        InvoiceSnapshot {
            store_name: "Abstract Realms".into(),
            store_domain: "shop.sarthakg.tech".into(),
            invoice_number: Some("INV-2026-0001".into()),
            order_id: Uuid::nil(),
            issued_on: Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap(),
            customer_name: "Ravi (Studio)".into(),
            phone: "9876543210".into(),
            email: Some("ravi@example.com".into()),
            product_name: "Custom Keychain with an extremely long product title".into(),
            variant_label: Some("Acrylic / Round".into()),
            is_customized: true,
            unit_price: dec!(399),
            quantity: 2,
            total_price: dec!(798),
        }
    }

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn invoice_numbers_are_zero_padded() {
        assert_eq!(format_invoice_number(2026, 1), "INV-2026-0001");
        assert_eq!(format_invoice_number(2026, 123), "INV-2026-0123");
        assert_eq!(format_invoice_number(2027, 12345), "INV-2027-12345");
    }

    #[test]
    fn renders_a_well_formed_document() {
        let pdf = as_text(&render_invoice(&snapshot()).unwrap());

        assert!(pdf.starts_with("%PDF-1.4\n"));
        assert!(pdf.ends_with("%%EOF\n"));
        assert!(pdf.contains("(Invoice #: INV-2026-0001)"));
        assert!(pdf.contains("(Date:      05 Mar 2026)"));
        assert!(pdf.contains("(Rs. 798.00)"));
        assert!(pdf.contains("(Customized)"));
        assert!(pdf.contains("(Ravi \\(Studio\\))"));
        assert!(pdf.contains("(Custom Keychain with an extremel...)"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = as_text(&render_invoice(&snapshot()).unwrap());

        let startxref: usize = pdf
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(pdf[startxref..].starts_with("xref\n0 7\n"));

        let entries: Vec<usize> = pdf[startxref..]
            .lines()
            .skip(3)
            .take(6)
            .map(|line| line[..10].parse().unwrap())
            .collect();
        for (i, offset) in entries.iter().enumerate() {
            assert!(pdf[*offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn rendering_is_deterministic_and_ascii() {
        let mut snap = snapshot();
        snap.customer_name = "Zoë".into();
        let a = render_invoice(&snap).unwrap();
        let b = render_invoice(&snap).unwrap();
        assert_eq!(a, b);
        assert!(a.is_ascii());
        assert!(as_text(&a).contains("(Zo?)"));
    }

    #[test]
    fn missing_invoice_number_is_a_precondition_failure() {
        let mut snap = snapshot();
        snap.invoice_number = None;
        assert_matches!(
            render_invoice(&snap),
            Err(ServiceError::PreconditionFailed(_))
        );
    }
}
