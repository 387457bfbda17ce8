use std::collections::BTreeMap;

use crate::config::Configuration;
use crate::contract::{
    AttributeValue, DocumentRequest, ResolvedParameters, ValueSource, DOCUMENT_EXTENSION,
    GENERATED_TARGET_PREFIX, TARGET_FILE_ATTRIBUTE, TEMPLATE_FILE_ATTRIBUTE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: String,
    pub source: ValueSource,
}

/// Returns the first present candidate together with the source that
/// supplied it. Candidate order is priority order.
pub fn first_present<I>(candidates: I) -> Option<Resolution>
where
    I: IntoIterator<Item = (ValueSource, Option<String>)>,
{
    candidates.into_iter().find_map(|(source, value)| {
        value.map(|value| Resolution { value, source })
    })
}

pub fn coerce(value: Option<&AttributeValue>) -> Option<String> {
    value.map(AttributeValue::to_substitution)
}

pub fn resolve_template_name(request: &DocumentRequest) -> Option<Resolution> {
    first_present([
        (ValueSource::RequestField, request.template_file.clone()),
        (
            ValueSource::Attribute,
            coerce(request.attribute(TEMPLATE_FILE_ATTRIBUTE)),
        ),
    ])
}

pub fn resolve_target_name(request: &DocumentRequest, now_millis: i64) -> Resolution {
    first_present([
        (ValueSource::RequestField, request.target_file.clone()),
        (
            ValueSource::Attribute,
            coerce(request.attribute(TARGET_FILE_ATTRIBUTE)),
        ),
    ])
    .unwrap_or_else(|| Resolution {
        value: generated_target_name(now_millis),
        source: ValueSource::GeneratedDefault,
    })
}

pub fn generated_target_name(now_millis: i64) -> String {
    format!("{GENERATED_TARGET_PREFIX}{now_millis}{DOCUMENT_EXTENSION}")
}

pub fn substitutions(request: &DocumentRequest) -> BTreeMap<String, String> {
    request
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.to_substitution()))
        .collect()
}

pub fn resolve_parameters(
    request: &DocumentRequest,
    config: &Configuration,
    now_millis: i64,
) -> ResolvedParameters {
    let template = resolve_template_name(request);
    let target = resolve_target_name(request, now_millis);

    ResolvedParameters {
        template_source: template.as_ref().map(|resolution| resolution.source),
        template_name: template.map(|resolution| resolution.value),
        target_path: format!("{}{}", config.result_folder, target.value),
        target_source: target.source,
        substitutions: substitutions(request),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WritePolicy;
    use crate::contract::Attributes;

    use super::*;

    const NOW: i64 = 1_760_000_000_123;

    fn request(
        template_file: Option<&str>,
        target_file: Option<&str>,
        attributes: &[(&str, AttributeValue)],
    ) -> DocumentRequest {
        DocumentRequest {
            template_file: template_file.map(str::to_string),
            target_file: target_file.map(str::to_string),
            attributes: attributes
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect::<Attributes>(),
        }
    }

    fn config() -> Configuration {
        Configuration {
            template_folder: "templates/".to_string(),
            result_folder: "results/".to_string(),
            bucket: "docs".to_string(),
            write_policy: WritePolicy::Overwrite,
        }
    }

    #[test]
    fn first_present_skips_absent_candidates() {
        let resolution = first_present([
            (ValueSource::RequestField, None),
            (ValueSource::Attribute, Some("b".to_string())),
            (ValueSource::GeneratedDefault, Some("c".to_string())),
        ])
        .expect("a candidate is present");
        assert_eq!(resolution.value, "b");
        assert_eq!(resolution.source, ValueSource::Attribute);

        assert_eq!(first_present([(ValueSource::RequestField, None)]), None);
    }

    #[test]
    fn template_field_wins_over_attribute() {
        let request = request(
            Some("field.docx"),
            None,
            &[("templateFile", AttributeValue::from("attr.docx"))],
        );
        let resolution = resolve_template_name(&request).expect("template resolved");
        assert_eq!(resolution.value, "field.docx");
        assert_eq!(resolution.source, ValueSource::RequestField);
    }

    #[test]
    fn template_falls_back_to_attribute_and_never_generates() {
        let request = request(
            None,
            None,
            &[("templateFile", AttributeValue::from("attr.docx"))],
        );
        let resolution = resolve_template_name(&request).expect("template resolved");
        assert_eq!(resolution.source, ValueSource::Attribute);

        assert_eq!(resolve_template_name(&self::request(None, None, &[])), None);
    }

    #[test]
    fn target_priority_is_field_then_attribute_then_generated() {
        let both = request(
            None,
            Some("field.docx"),
            &[("targetFile", AttributeValue::from("attr.docx"))],
        );
        assert_eq!(
            resolve_target_name(&both, NOW),
            Resolution {
                value: "field.docx".to_string(),
                source: ValueSource::RequestField
            }
        );

        let attribute_only = request(
            None,
            None,
            &[("targetFile", AttributeValue::from("attr.docx"))],
        );
        assert_eq!(
            resolve_target_name(&attribute_only, NOW).source,
            ValueSource::Attribute
        );

        let generated = resolve_target_name(&request(None, None, &[]), NOW);
        assert_eq!(generated.source, ValueSource::GeneratedDefault);
        assert_eq!(generated.value, "new_file_1760000000123.docx");
    }

    #[test]
    fn target_fallback_ignores_template_attribute() {
        let request = request(
            None,
            None,
            &[("templateFile", AttributeValue::from("template.docx"))],
        );
        assert_eq!(
            resolve_target_name(&request, NOW).source,
            ValueSource::GeneratedDefault
        );
    }

    #[test]
    fn generated_target_name_has_expected_shape() {
        let name = generated_target_name(NOW);
        let digits = name
            .strip_prefix("new_file_")
            .and_then(|rest| rest.strip_suffix(".docx"))
            .expect("prefix and extension present");
        assert!(!digits.is_empty());
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn resolve_parameters_prefixes_result_folder_and_flattens_lists() {
        let request = request(
            Some("report.docx"),
            None,
            &[
                ("targetFile", AttributeValue::from("out.docx")),
                (
                    "names",
                    AttributeValue::List(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
                ),
            ],
        );

        let resolved = resolve_parameters(&request, &config(), NOW);
        assert_eq!(resolved.template_name.as_deref(), Some("report.docx"));
        assert_eq!(resolved.template_source, Some(ValueSource::RequestField));
        assert_eq!(resolved.target_path, "results/out.docx");
        assert_eq!(resolved.target_source, ValueSource::Attribute);
        assert_eq!(resolved.substitutions["names"], "a, b, c");
        assert_eq!(resolved.substitutions["targetFile"], "out.docx");
    }
}
