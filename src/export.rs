//! Renders the clearance report workbook. Rows flagged `is_redacted` have
//! their sensitive columns replaced with [`REDACTED`] in the output; reason,
//! suggestion, severity, category, sub-category, and clearance status are
//! never redacted.

use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::models::{RiskFlag, Script};
use crate::taxonomy::RiskSeverity;

pub const REDACTED: &str = "[REDACTED]";

const HEADERS: [&str; 12] = [
    "Page",
    "Severity",
    "Category",
    "Sub-Category",
    "Entity Name",
    "Snippet",
    "Reason",
    "Suggestion",
    "Status",
    "Comments",
    "Restrictions",
    "Redacted",
];

const COLUMN_WIDTHS: [f64; 12] = [
    8.0, 12.0, 22.0, 28.0, 25.0, 40.0, 45.0, 45.0, 25.0, 35.0, 35.0, 12.0,
];

/// One rendered report row with the redaction rule already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub page: i32,
    pub severity: String,
    pub category: String,
    pub sub_category: String,
    pub entity_name: String,
    pub snippet: String,
    pub reason: String,
    pub suggestion: String,
    pub status: String,
    pub comments: String,
    pub restrictions: String,
    pub redacted: bool,
}

/// Applies the redaction rule. Kept separate from the workbook rendering so
/// the rule is testable without decoding the binary sheet.
pub fn report_rows(risks: &[RiskFlag]) -> Vec<ReportRow> {
    risks
        .iter()
        .map(|risk| {
            let text = |value: &Option<String>| value.clone().unwrap_or_default();

            let (entity_name, snippet, comments, restrictions) = if risk.is_redacted {
                (
                    REDACTED.to_string(),
                    REDACTED.to_string(),
                    REDACTED.to_string(),
                    REDACTED.to_string(),
                )
            } else {
                (
                    text(&risk.entity_name),
                    text(&risk.snippet),
                    text(&risk.comments),
                    text(&risk.restrictions),
                )
            };

            ReportRow {
                page: risk.page_number,
                severity: risk.severity.clone(),
                category: risk.category.clone(),
                sub_category: risk.sub_category.clone(),
                entity_name,
                snippet,
                reason: text(&risk.reason),
                suggestion: text(&risk.suggestion),
                status: risk.status.clone(),
                comments,
                restrictions,
                redacted: risk.is_redacted,
            }
        })
        .collect()
}

/// Report ordering: severity rank first (HIGH before LOW), then page number.
pub fn sort_for_report(risks: &mut [RiskFlag]) {
    risks.sort_by_key(|risk| {
        let rank = RiskSeverity::from_str_exact(&risk.severity)
            .map(RiskSeverity::rank)
            .unwrap_or(u8::MAX);
        (rank, risk.page_number)
    });
}

pub fn generate_report(script: &Script, risks: &[RiskFlag]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet
        .set_name("Clearance Report")
        .context("failed to name report sheet")?;

    let title_format = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x065F46))
        .set_align(FormatAlign::Center);
    let header_format = Format::new()
        .set_bold()
        .set_font_size(10)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x0F172A))
        .set_border_bottom(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let high_format = severity_format(0xDC3545);
    let medium_format = severity_format(0xFFC107);
    let low_format = severity_format(0x198754);
    let redacted_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0xFF5050))
        .set_background_color(Color::RGB(0x1E1E1E))
        .set_align(FormatAlign::Center);
    let data_format = Format::new()
        .set_text_wrap()
        .set_align(FormatAlign::Top)
        .set_border_bottom(FormatBorder::Hair)
        .set_border_right(FormatBorder::Hair);

    sheet
        .merge_range(
            0,
            0,
            0,
            (HEADERS.len() - 1) as u16,
            "SCRIPTSENTRIES - LEGAL CLEARANCE REPORT",
            &title_format,
        )
        .context("failed to write report title")?;

    sheet.write(1, 0, format!("Script: {}", script.filename))?;
    sheet.write(1, 4, format!("Pages: {}", script.total_pages))?;
    sheet.write(1, 6, format!("Risks: {}", risks.len()))?;
    sheet.write(
        1,
        8,
        format!("Generated: {}", script.uploaded_at.format("%Y-%m-%d %H:%M")),
    )?;

    let header_row = 3;
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_with_format(header_row, col as u16, *header, &header_format)?;
    }

    for (offset, row) in report_rows(risks).iter().enumerate() {
        let row_index = header_row + 1 + offset as u32;

        let severity_style = match RiskSeverity::from_str_exact(&row.severity) {
            Some(RiskSeverity::High) => &high_format,
            Some(RiskSeverity::Medium) | None => &medium_format,
            Some(RiskSeverity::Low) => &low_format,
        };
        let sensitive_style = if row.redacted {
            &redacted_format
        } else {
            &data_format
        };

        sheet.write_with_format(row_index, 0, row.page.to_string(), &data_format)?;
        sheet.write_with_format(row_index, 1, &row.severity, severity_style)?;
        sheet.write_with_format(row_index, 2, &row.category, &data_format)?;
        sheet.write_with_format(row_index, 3, &row.sub_category, &data_format)?;
        sheet.write_with_format(row_index, 4, &row.entity_name, sensitive_style)?;
        sheet.write_with_format(row_index, 5, &row.snippet, sensitive_style)?;
        sheet.write_with_format(row_index, 6, &row.reason, &data_format)?;
        sheet.write_with_format(row_index, 7, &row.suggestion, &data_format)?;
        sheet.write_with_format(row_index, 8, &row.status, &data_format)?;
        sheet.write_with_format(row_index, 9, &row.comments, sensitive_style)?;
        sheet.write_with_format(row_index, 10, &row.restrictions, sensitive_style)?;
        sheet.write_with_format(
            row_index,
            11,
            if row.redacted { "YES" } else { "NO" },
            sensitive_style,
        )?;
    }

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    workbook
        .save_to_buffer()
        .context("failed to render clearance report")
}

/// Attachment name: sanitized script filename plus a timestamp.
pub fn export_filename(script: &Script) -> String {
    let stem = script
        .filename
        .trim_end_matches(".pdf")
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!(
        "ScriptSentries_{}_{}.xlsx",
        stem,
        script.uploaded_at.format("%Y%m%d_%H%M")
    )
}

fn severity_format(rgb: u32) -> Format {
    Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(rgb))
        .set_align(FormatAlign::Center)
}
