use tera::{Context, Tera};

use debrief_core::domain::report::StructuredReport;

use super::CrmError;

const NOTE_TEMPLATE: &str = "report_note.html";
const CALL_TEMPLATE: &str = "report_call.txt";

/// Renders reports into CRM note (HTML) and call (plain text) bodies.
pub struct ReportFormatter {
    templates: Tera,
}

impl ReportFormatter {
    pub fn new() -> Result<Self, CrmError> {
        let mut templates = Tera::default();
        templates
            .add_raw_templates(vec![
                (NOTE_TEMPLATE, include_str!("../../../../templates/crm/report_note.html")),
                (CALL_TEMPLATE, include_str!("../../../../templates/crm/report_call.txt")),
            ])
            .map_err(|error| CrmError::Template(error.to_string()))?;
        Ok(Self { templates })
    }

    pub fn note_html(&self, report: &StructuredReport) -> Result<String, CrmError> {
        self.render(NOTE_TEMPLATE, report)
    }

    pub fn call_text(&self, report: &StructuredReport) -> Result<String, CrmError> {
        self.render(CALL_TEMPLATE, report)
    }

    fn render(&self, template: &str, report: &StructuredReport) -> Result<String, CrmError> {
        let mut context = Context::new();
        context.insert("report", report);
        self.templates
            .render(template, &context)
            .map_err(|error| CrmError::Template(format!("{template}: {error}")))
    }
}

/// `Call Report: {customer company} - {call date}`, where the customer company
/// is taken from the first attendee outside `internal_company`.
pub fn call_title(report: &StructuredReport, internal_company: &str) -> String {
    let internal = internal_company.to_lowercase();
    let customer = report
        .attendees
        .iter()
        .find(|attendee| internal.is_empty() || !attendee.company.to_lowercase().contains(&internal))
        .map(|attendee| attendee.company.as_str())
        .filter(|company| !company.is_empty())
        .unwrap_or("Customer");
    format!("Call Report: {customer} - {}", report.call_date)
}
