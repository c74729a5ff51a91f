//! State machine properties for analysis lifecycle status

use proptest::prelude::*;
use smicrab_core::{
    allowed_transitions, validate_transition, AnalyzeStatus, ModuleName, StatusView,
};

fn any_status() -> impl Strategy<Value = AnalyzeStatus> {
    prop_oneof![
        Just(AnalyzeStatus::Pending),
        Just(AnalyzeStatus::Configured),
        Just(AnalyzeStatus::InProgress),
        Just(AnalyzeStatus::Completed),
        Just(AnalyzeStatus::Error),
        Just(AnalyzeStatus::Unknown),
    ]
}

fn any_module() -> impl Strategy<Value = ModuleName> {
    prop_oneof![
        Just(ModuleName::LoadModule),
        Just(ModuleName::DescribeModule),
        Just(ModuleName::EstimateModule),
        Just(ModuleName::ValidateModule),
        Just(ModuleName::RiskMapModule),
        Just(ModuleName::Unknown),
    ]
}

#[test]
fn test_pending_transitions() {
    assert!(validate_transition(AnalyzeStatus::Pending, AnalyzeStatus::Configured).is_ok());

    // Invalid
    assert!(validate_transition(AnalyzeStatus::Pending, AnalyzeStatus::InProgress).is_err());
    assert!(validate_transition(AnalyzeStatus::Pending, AnalyzeStatus::Completed).is_err());
}

#[test]
fn test_in_progress_is_backend_driven() {
    assert_eq!(
        allowed_transitions(AnalyzeStatus::InProgress),
        vec![AnalyzeStatus::Completed, AnalyzeStatus::Error]
    );
}

#[test]
fn test_wire_names() {
    let decoded: Vec<AnalyzeStatus> =
        serde_json::from_str(r#"["pending","configured","in_progress","completed","error","paused"]"#)
            .unwrap();
    assert_eq!(
        decoded,
        vec![
            AnalyzeStatus::Pending,
            AnalyzeStatus::Configured,
            AnalyzeStatus::InProgress,
            AnalyzeStatus::Completed,
            AnalyzeStatus::Error,
            AnalyzeStatus::Unknown,
        ]
    );
}

proptest! {
    #[test]
    fn prop_all_transitions_are_subset_of_allowed(from in any_status(), to in any_status()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_completed_is_absorbing(steps in prop::collection::vec(any_status(), 0..32)) {
        let mut current = AnalyzeStatus::Completed;
        for next in steps {
            if validate_transition(current, next).is_ok() {
                current = next;
            }
        }
        prop_assert_eq!(current, AnalyzeStatus::Completed);
    }

    #[test]
    fn prop_only_completed_is_cacheable(status in any_status()) {
        prop_assert_eq!(status.is_cacheable(), status == AnalyzeStatus::Completed);
        prop_assert_eq!(status.should_poll(), !status.is_terminal());
    }

    #[test]
    fn prop_view_is_total(
        status in any_status(),
        module in any_module(),
        message in proptest::option::of("[a-z ]{0,40}"),
    ) {
        let view = StatusView::for_status(status, module, message.as_deref());
        match status {
            AnalyzeStatus::Error => {
                let is_failure = matches!(view, StatusView::Failure { .. });
                prop_assert!(is_failure);
            }
            AnalyzeStatus::InProgress => prop_assert_eq!(view, StatusView::InProgress { module }),
            _ => prop_assert!(!view.offers_retry()),
        }
    }
}
