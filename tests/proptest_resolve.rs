//! Property-based tests using proptest
//!
//! These tests verify resolution formatting, environment-name sanitizing
//! and context discovery over randomized inputs.

mod common;

use common::{bq_table, bucket, data_collection, InMemoryFetcher};
use proptest::prelude::*;
use std::collections::BTreeSet;
use uuid::Uuid;
use wsctl::context::{ContextStore, STATE_DIR, STATE_FILE};
use wsctl::resource::{resolve_local, BqPathFormat, Resolver, ResolveOptions, GCS_PREFIX};
use wsctl::shell::{resource_env_name, ENV_PREFIX};

/// Names the catalog accepts
fn arb_resource_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,40}"
}

/// GCS bucket names: lowercase, digits, dashes, dots
fn arb_bucket_name() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]"
}

fn arb_bq_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,30}"
}

fn options(exclude_bucket_prefix: bool, bq_path_format: BqPathFormat) -> ResolveOptions {
    ResolveOptions {
        exclude_bucket_prefix,
        bq_path_format,
    }
}

proptest! {
    /// Prefix + no-prefix result == with-prefix result
    #[test]
    fn test_bucket_prefix_is_only_difference(name in arb_resource_name(), bucket_name in arb_bucket_name()) {
        let resource = bucket(&name, &bucket_name);
        let with_prefix = resolve_local(&resource, &options(false, BqPathFormat::FullPath)).unwrap();
        let without_prefix = resolve_local(&resource, &options(true, BqPathFormat::FullPath)).unwrap();

        prop_assert_eq!(format!("{}{}", GCS_PREFIX, without_prefix), with_prefix);
        prop_assert!(!without_prefix.starts_with(GCS_PREFIX));
    }

    /// The table id is a suffix of the full path, the project id a prefix
    #[test]
    fn test_table_only_within_full_path(
        project in arb_bq_id(),
        dataset in arb_bq_id(),
        table in arb_bq_id(),
    ) {
        let resource = bq_table("t", &project, &dataset, &table);
        let full = resolve_local(&resource, &options(false, BqPathFormat::FullPath)).unwrap();
        let table_only = resolve_local(&resource, &options(false, BqPathFormat::TableIdOnly)).unwrap();
        let project_only = resolve_local(&resource, &options(false, BqPathFormat::ProjectIdOnly)).unwrap();

        prop_assert!(full.contains(&table_only));
        let table_suffix = format!(".{}", table_only);
        let project_prefix = format!("{}.", project_only);
        prop_assert!(full.ends_with(&table_suffix));
        prop_assert!(full.starts_with(&project_prefix));
    }

    /// Exported variable names are legal shell identifiers
    #[test]
    fn test_env_names_are_legal(name in "\\PC{1,40}") {
        let env_name = resource_env_name(&name);
        prop_assert!(env_name.starts_with(ENV_PREFIX));
        prop_assert!(env_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        prop_assert_eq!(env_name.chars().count(), ENV_PREFIX.len() + name.chars().count());
    }

    /// Valid resource names keep their letters and digits in place
    #[test]
    fn test_env_names_keep_alphanumerics(name in arb_resource_name()) {
        let env_name = resource_env_name(&name);
        let suffix = &env_name[ENV_PREFIX.len()..];
        for (original, exported) in name.chars().zip(suffix.chars()) {
            if original.is_ascii_alphanumeric() {
                prop_assert_eq!(original, exported);
            } else {
                prop_assert_eq!(exported, '_');
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Discovery from any depth below the bound root finds the root's file
    #[test]
    fn test_locate_from_any_depth(segments in prop::collection::vec("[a-z]{1,8}", 0..6)) {
        let root = tempfile::tempdir().unwrap();
        let state_dir = root.path().join(STATE_DIR);
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::write(state_dir.join(STATE_FILE), "{}").unwrap();

        let mut deep = root.path().to_path_buf();
        for segment in &segments {
            deep.push(segment);
        }
        std::fs::create_dir_all(&deep).unwrap();

        let from_root = ContextStore::locate_context_file(root.path());
        let from_deep = ContextStore::locate_context_file(&deep);
        prop_assert!(from_root.is_some());
        prop_assert_eq!(from_root, from_deep);
    }

    /// Plain-name resolution of a collection is keyed by exactly the
    /// referenced workspace's non-collection names, and each nested
    /// `collection/name` resolution matches its entry
    #[test]
    fn test_collection_keys_and_nested_lookup(
        names in prop::collection::btree_set("[a-z][a-z0-9_]{0,12}", 0..8),
        nested_collections in 0usize..3,
    ) {
        let referenced = Uuid::new_v4();
        let mut members: Vec<_> = names
            .iter()
            .map(|name| bucket(name, &format!("{}-bkt", name.replace('_', "-"))))
            .collect();
        for i in 0..nested_collections {
            members.push(data_collection(&format!("inner{i}"), Uuid::new_v4()));
        }
        let fetcher = InMemoryFetcher::default().with_workspace(referenced, members);
        let context = common::bound_context(vec![data_collection("dc", referenced)]);

        tokio_test::block_on(async {
            let resolver = Resolver::new(&fetcher);
            let opts = ResolveOptions::default();
            let mapping = resolver.resolve_path(&context, "dc", &opts).await.unwrap();

            let keys: BTreeSet<String> = mapping.keys().cloned().collect();
            prop_assert_eq!(&keys, &names);

            for name in &names {
                let nested = resolver
                    .resolve_path(&context, &format!("dc/{name}"), &opts)
                    .await
                    .unwrap();
                prop_assert_eq!(nested.get(name), mapping.get(name));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
