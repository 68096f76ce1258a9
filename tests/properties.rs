// Property-based tests for reference sets, unit-name sanitising and classification
//
// These tests verify:
// - ReferenceSet keeps the first spelling of each case-insensitive path, in order
// - sanitize_unit_name always yields a non-empty, file-name-safe name
// - classify fails exactly when there is an error, a non-zero exit, or no unit

use hashbrown::HashSet;
use proptest::prelude::*;

use scriptc::core::staging::MAX_UNIT_NAME_LEN;
use scriptc::core::{classify, sanitize_unit_name};
use scriptc::{Diagnostic, Invocation, ReferenceSet, Severity, UnitHandle};

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![Just(Severity::Info), Just(Severity::Warning), Just(Severity::Error)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn reference_set_is_first_spelling_wins(paths in prop::collection::vec("/[a-cA-C]{1,3}", 0..20)) {
        let set: ReferenceSet = paths.iter().cloned().collect();

        let mut seen = HashSet::new();
        let expected: Vec<&str> = paths
            .iter()
            .filter(|path| seen.insert(path.to_lowercase()))
            .map(String::as_str)
            .collect();

        prop_assert_eq!(set.iter().collect::<Vec<_>>(), expected);
        for path in &paths {
            prop_assert!(set.contains(&path.to_uppercase()));
        }
    }

    #[test]
    fn sanitized_names_are_file_safe(name in "\\PC{0,200}") {
        let sanitized = sanitize_unit_name(&name);

        prop_assert!(!sanitized.is_empty());
        prop_assert!(sanitized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')));
        if !name.is_empty() {
            prop_assert_eq!(sanitized.len(), name.chars().count().min(MAX_UNIT_NAME_LEN));
        }
    }

    #[test]
    fn classification_matches_verdict_rule(
        severities in prop::collection::vec(severity(), 0..6),
        exit_status in prop_oneof![Just(0), -1i32..4],
        has_unit in any::<bool>(),
    ) {
        let diagnostics: Vec<Diagnostic> = severities
            .iter()
            .map(|severity| Diagnostic::new(*severity, "message"))
            .collect();
        let has_error = severities.contains(&Severity::Error);
        let invocation = Invocation {
            diagnostics,
            exit_status,
            unit: has_unit.then(|| UnitHandle::Image(vec![1, 2, 3])),
        };

        let success = classify(invocation).is_success();
        prop_assert_eq!(success, !has_error && exit_status == 0 && has_unit);
    }
}
