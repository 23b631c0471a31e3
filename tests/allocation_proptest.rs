/// Property-based tests for port allocation and the PORT/env invariant
///
/// - `allocate` returns the smallest unused port in the range
/// - it reports exhaustion exactly when every port in the range is used
/// - repeated registrations never hand out a port twice
/// - environment records round-trip arbitrary entries
use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use svcreg::mirror::{parse, render};
use svcreg::port::{allocate_from, AllocationError};
use svcreg::{
    MemoryController, PortRange, Registration, ServiceEntry, ServiceRegistry, Settings,
    StorePaths,
};

/// Strategy for a small range plus a set of used ports that may fall inside it
fn range_and_used() -> impl Strategy<Value = (PortRange, HashSet<u16>)> {
    (1024u16..60000u16, 1u16..40u16).prop_flat_map(|(start, width)| {
        let end = start + width;
        (
            Just(PortRange::new(start, end)),
            prop::collection::vec(start.saturating_sub(5)..=end.saturating_add(5), 0..50)
                .prop_map(|ports| ports.into_iter().collect::<HashSet<u16>>()),
        )
    })
}

/// Strategy for environment keys that are not reserved
fn env_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z_][A-Z0-9_]{0,12}")
        .expect("Valid regex")
        .prop_filter("reserved key", |k| {
            !matches!(k.as_str(), "COMMAND" | "WORKING_DIR" | "PORT")
        })
}

/// Strategy for single-line values, including '=' and spaces
fn env_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,30}").expect("Valid regex")
}

proptest! {
    #[test]
    fn allocation_returns_smallest_unused((range, used) in range_and_used()) {
        let expected = (range.start..=range.end).find(|p| !used.contains(p));
        match allocate_from(&range, &used) {
            Ok(port) => {
                prop_assert_eq!(Some(port), expected);
                prop_assert!(range.contains(port));
                prop_assert!(!used.contains(&port));
            }
            Err(AllocationError::Exhausted { start, end }) => {
                prop_assert!(expected.is_none());
                prop_assert_eq!((start, end), (range.start, range.end));
            }
        }
    }

    #[test]
    fn allocation_is_deterministic((range, used) in range_and_used()) {
        prop_assert_eq!(allocate_from(&range, &used), allocate_from(&range, &used));
    }

    #[test]
    fn mirror_round_trips_entries(
        command in "[ -~]{1,40}",
        port in 1u16..=u16::MAX,
        dir in prop::option::of("/[a-z/]{1,20}"),
        env in prop::collection::btree_map(env_key_strategy(), env_value_strategy(), 0..8),
    ) {
        prop_assume!(!command.trim().is_empty());
        let entry = ServiceEntry::new(command, port, dir.unwrap_or_default())
            .with_env(env.into_iter().collect::<BTreeMap<_, _>>());

        let record = parse(&render(&entry)).expect("rendered record parses");
        prop_assert_eq!(&record.command, &entry.command);
        prop_assert_eq!(record.port, entry.port);
        prop_assert_eq!(&record.working_dir, &entry.working_dir);
        prop_assert_eq!(&record.env, &entry.env);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn registrations_never_share_auto_assigned_ports(count in 1usize..12) {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = ServiceRegistry::open(
            StorePaths::from_root(temp.path()),
            &Settings::default(),
            Arc::new(MemoryController::new()),
        );
        registry.add_range("small", 9000, 9005).unwrap();

        let mut ports = HashSet::new();
        for i in 0..count {
            match registry.register(Registration::new(format!("svc{}", i), "run").range("small")) {
                Ok(entry) => {
                    prop_assert!(ports.insert(entry.port), "port {} handed out twice", entry.port);
                    prop_assert!(entry.port_env_in_sync());
                }
                Err(svcreg::Error::PortExhausted { .. }) => prop_assert_eq!(ports.len(), 6),
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            }
        }
        prop_assert_eq!(ports.len(), count.min(6));
    }
}
