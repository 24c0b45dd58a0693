use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::config::{CheckWhen, FormConfig};
use crate::parser::Extraction;
use crate::pdf::form::{FormTemplate, PdfForm};
use crate::pdf::PdfError;

/// Flat key → value view of an extraction, keyed by the form mapping.
pub type Projection = BTreeMap<String, String>;

/// Fields written and template names that had no widget.
#[derive(Debug, Default)]
pub struct FillReport {
    pub written: Vec<String>,
    pub missing: Vec<String>,
}

pub fn build_projection(extraction: &Extraction, form: &FormConfig) -> Projection {
    form.projection
        .iter()
        .filter_map(|rule| {
            extraction
                .value(&rule.section, &rule.label)
                .map(|v| (rule.key.clone(), v.to_string()))
        })
        .collect()
}

/// Today's calendar date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

/// Write projection values, checkbox states and the date stamp into `template`.
/// A name without a widget is recorded in the report and skipped.
pub fn fill_form<T: FormTemplate>(
    template: &mut T,
    projection: &Projection,
    form: &FormConfig,
    today: NaiveDate,
) -> Result<FillReport, PdfError> {
    let mut report = FillReport::default();

    for binding in &form.text_fields {
        let Some(value) = projection.get(&binding.key) else {
            debug!(key = %binding.key, "no value, leaving field blank");
            continue;
        };
        match template.find_widget(&binding.field) {
            Some(w) => {
                template.set_text(w, value)?;
                report.written.push(binding.field.clone());
            }
            None => report.missing.push(binding.field.clone()),
        }
    }

    for rule in &form.checkboxes {
        let checked = match &rule.when {
            CheckWhen::Always => true,
            CheckWhen::NonEmpty(key) => projection.get(key).is_some_and(|v| !v.trim().is_empty()),
        };
        match template.find_widget(&rule.field) {
            Some(w) => {
                template.set_checkbox(w, checked)?;
                report.written.push(rule.field.clone());
            }
            None => report.missing.push(rule.field.clone()),
        }
    }

    if let Some(field) = &form.date_field {
        let mut stamp = String::new();
        if write!(stamp, "{}", today.format(&form.date_format)).is_err() {
            warn!(format = %form.date_format, "invalid date format, skipping date stamp");
        } else {
            match template.find_widget(field) {
                Some(w) => {
                    template.set_text(w, &stamp)?;
                    report.written.push(field.clone());
                }
                None => report.missing.push(field.clone()),
            }
        }
    }

    Ok(report)
}

/// Fill a PDF template held in memory and return the new document bytes.
pub fn fill_pdf(
    template: &[u8],
    projection: &Projection,
    form: &FormConfig,
    today: NaiveDate,
) -> Result<Vec<u8>, PdfError> {
    let mut pdf = PdfForm::open(template)?;
    let report = fill_form(&mut pdf, projection, form, today)?;
    for name in &report.missing {
        warn!(field = %name, "template has no such field, skipped");
    }
    info!(
        "Filled {} fields ({} missing in template)",
        report.written.len(),
        report.missing.len()
    );
    pdf.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::extract_requested_fields;
    use crate::pdf::form::sample_template;

    #[derive(Debug, Clone, PartialEq)]
    enum Value {
        Blank,
        Text(String),
        Checked(bool),
    }

    /// In-memory template: a list of named widgets, duplicates allowed.
    struct FakeForm {
        widgets: Vec<(String, Value)>,
    }

    impl FakeForm {
        fn new(names: &[&str]) -> Self {
            Self {
                widgets: names.iter().map(|n| (n.to_string(), Value::Blank)).collect(),
            }
        }

        fn get(&self, name: &str) -> &Value {
            &self.widgets.iter().find(|(n, _)| n == name).unwrap().1
        }
    }

    impl FormTemplate for FakeForm {
        type Widget = usize;

        fn find_widget(&self, name: &str) -> Option<usize> {
            self.widgets.iter().position(|(n, _)| n == name)
        }

        fn set_text(&mut self, widget: usize, value: &str) -> Result<(), PdfError> {
            self.widgets[widget].1 = Value::Text(value.to_string());
            Ok(())
        }

        fn set_checkbox(&mut self, widget: usize, checked: bool) -> Result<(), PdfError> {
            self.widgets[widget].1 = Value::Checked(checked);
            Ok(())
        }
    }

    const ALL_FIELDS: &[&str] = &[
        "Name",
        "Anschrift",
        "Telefon",
        "Anschlussort",
        "Messkonzept",
        "PV_Leistung_kWp",
        "Speicher_kWh",
        "PV_Anlage",
        "Speicher_vorhanden",
        "Datum",
    ];

    fn projection(pairs: &[(&str, &str)]) -> Projection {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    #[test]
    fn projection_from_fixture() {
        let text = std::fs::read_to_string("tests/fixtures/anmeldung.txt").unwrap();
        let config = Config::default();
        let r = extract_requested_fields(&crate::pdf::split_lines(&text), &config);
        let p = build_projection(&r, &config.form);
        assert_eq!(p.len(), 7);
        assert_eq!(p["name"], "Herr Max Mustermann");
        assert_eq!(p["anschlussort"], "Lindenallee 7");
        assert_eq!(p["pv_kwp"], "9,84");
        assert_eq!(p["speicher_kwh"], "10,24");
    }

    #[test]
    fn projection_omits_missing_values() {
        let config = Config::default();
        let lines: Vec<String> = ["Anschlussort", "Straße: A 1"].iter().map(|s| s.to_string()).collect();
        let p = build_projection(&extract_requested_fields(&lines, &config), &config.form);
        assert_eq!(p, projection(&[("anschlussort", "A 1")]));
    }

    #[test]
    fn storage_checkbox_off_when_empty() {
        let mut form = FakeForm::new(ALL_FIELDS);
        let p = projection(&[("speicher_kwh", "")]);
        fill_form(&mut form, &p, &FormConfig::default(), day()).unwrap();
        assert_eq!(form.get("Speicher_vorhanden"), &Value::Checked(false));
        assert_eq!(form.get("PV_Anlage"), &Value::Checked(true));
    }

    #[test]
    fn storage_checkbox_on_when_present() {
        let mut form = FakeForm::new(ALL_FIELDS);
        let p = projection(&[("speicher_kwh", "10.5")]);
        fill_form(&mut form, &p, &FormConfig::default(), day()).unwrap();
        assert_eq!(form.get("Speicher_vorhanden"), &Value::Checked(true));
        assert_eq!(form.get("Speicher_kWh"), &Value::Text("10.5".into()));
    }

    #[test]
    fn storage_checkbox_off_when_absent() {
        let mut form = FakeForm::new(ALL_FIELDS);
        fill_form(&mut form, &Projection::new(), &FormConfig::default(), day()).unwrap();
        assert_eq!(form.get("Speicher_vorhanden"), &Value::Checked(false));
        assert_eq!(form.get("Name"), &Value::Blank);
    }

    #[test]
    fn date_stamp_always_written() {
        let mut form = FakeForm::new(ALL_FIELDS);
        fill_form(&mut form, &Projection::new(), &FormConfig::default(), day()).unwrap();
        assert_eq!(form.get("Datum"), &Value::Text("05.03.2026".into()));
    }

    #[test]
    fn missing_template_field_is_skipped() {
        let fields: Vec<&str> = ALL_FIELDS.iter().copied().filter(|f| *f != "Telefon").collect();
        let mut form = FakeForm::new(&fields);
        let p = projection(&[("name", "Herr A"), ("telefon", "123"), ("pv_kwp", "5")]);
        let report = fill_form(&mut form, &p, &FormConfig::default(), day()).unwrap();
        assert_eq!(report.missing, vec!["Telefon".to_string()]);
        assert_eq!(form.get("Name"), &Value::Text("Herr A".into()));
        assert_eq!(form.get("PV_Leistung_kWp"), &Value::Text("5".into()));
        assert_eq!(form.get("Anschrift"), &Value::Blank);
    }

    #[test]
    fn duplicate_names_fill_first_widget() {
        let mut form = FakeForm::new(&["Name", "Name"]);
        let p = projection(&[("name", "Herr A")]);
        fill_form(&mut form, &p, &FormConfig::default(), day()).unwrap();
        assert_eq!(form.widgets[0].1, Value::Text("Herr A".into()));
        assert_eq!(form.widgets[1].1, Value::Blank);
    }

    #[test]
    fn invalid_date_format_skips_stamp() {
        let mut form = FakeForm::new(ALL_FIELDS);
        let cfg = FormConfig {
            date_format: "%Q".into(),
            ..FormConfig::default()
        };
        fill_form(&mut form, &Projection::new(), &cfg, day()).unwrap();
        assert_eq!(form.get("Datum"), &Value::Blank);
    }

    #[test]
    fn today_is_a_real_date() {
        let d = today_in(chrono_tz::Europe::Berlin);
        let utc = Utc::now().date_naive();
        assert!((d - utc).num_days().abs() <= 1);
    }

    #[test]
    fn fill_pdf_template() {
        let p = projection(&[("name", "Herr Max Mustermann"), ("speicher_kwh", "10,24")]);
        let bytes = fill_pdf(&sample_template(), &p, &FormConfig::default(), day()).unwrap();
        let filled = PdfForm::open(&bytes).unwrap();
        assert_eq!(filled.value("Name").as_deref(), Some("Herr Max Mustermann"));
        assert_eq!(filled.value("Speicher_kWh").as_deref(), Some("10,24"));
        assert_eq!(filled.value("Speicher_vorhanden").as_deref(), Some("Ja"));
        assert_eq!(filled.value("PV_Anlage").as_deref(), Some("Yes"));
        assert_eq!(filled.value("Datum").as_deref(), Some("05.03.2026"));
        // the template bytes are never modified
        let pristine = PdfForm::open(&sample_template()).unwrap();
        assert_eq!(pristine.value("Name"), None);
    }
}
