//! Property-based tests using proptest

use proptest::prelude::*;
use std::sync::Arc;
use textpipe::registry::{add_filter, FilterFn};
use textpipe::{normalize_name, normalize_variable, Pipeline, PipelineCommand, VariableStore};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn test_empty_pipeline_is_identity(input in "[ -~]{0,64}") {
        let mut pipeline = Pipeline::new();
        prop_assert_eq!(pipeline.execute(Some(&input)).unwrap(), input);
    }

    #[test]
    fn test_variable_lookup_is_normalization_invariant(
        key in "[A-Za-z][A-Za-z0-9_]{0,12}",
        value in "[ -~]{0,32}",
        sigil in proptest::bool::ANY
    ) {
        let mut store = VariableStore::new();
        let written = if sigil { format!("${key}") } else { key.clone() };
        store.set(&written, Some(value.clone()), false);

        // Any spelling of the key addresses the same slot.
        prop_assert_eq!(store.get(&key, false).unwrap(), value.clone());
        prop_assert_eq!(store.get(&key.to_uppercase(), false).unwrap(), value.clone());
        prop_assert_eq!(store.get(&format!("${key}"), false).unwrap(), value.clone());
        prop_assert_eq!(
            store.get(&normalize_variable(&key), false).unwrap(),
            value
        );
    }

    #[test]
    fn test_name_normalization_is_idempotent(
        category in "[A-Za-z][A-Za-z0-9-]{0,10}",
        name in "[A-Za-z][A-Za-z0-9_]{0,10}"
    ) {
        let qualified = format!("{category}.{name}");
        let once = normalize_name(&qualified);
        prop_assert_eq!(normalize_name(&once), once.clone());
        // Case never matters.
        prop_assert_eq!(normalize_name(&qualified.to_uppercase()), once);
    }

    #[test]
    fn test_last_registration_wins_for_any_casing(
        name in "[a-z][a-z0-9]{0,8}",
        first_output in "[a-z]{1,8}",
        second_output in "[a-z]{1,8}"
    ) {
        let make = |out: String| -> FilterFn { Arc::new(move |_, _, _| Ok(out.clone())) };
        add_filter(make(first_output), "overrides", &name, None);
        add_filter(make(second_output.clone()), "overrides", &name.to_uppercase(), None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new(format!("Overrides.{}", name.to_uppercase())));
        prop_assert_eq!(pipeline.execute(Some("")).unwrap(), second_output);
    }

    #[test]
    fn test_append_dispatch_concatenates(
        input in "[ -~]{0,32}",
        suffix in "[A-Za-z0-9 ]{0,16}"
    ) {
        let append: FilterFn = Arc::new(|input, cmd, _log| {
            Ok(format!("{input}{}", cmd.positional(0).unwrap_or_default()))
        });
        add_filter(append, "proptest", "concat", None);

        let mut pipeline = Pipeline::new();
        pipeline.add_command(PipelineCommand::new("proptest.concat").with_arg(0, suffix.clone()));
        prop_assert_eq!(
            pipeline.execute(Some(&input)).unwrap(),
            format!("{input}{suffix}")
        );
    }
}
