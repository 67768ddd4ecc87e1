//! Property tests for the reconnect bound.
//!
//! Invariants tested:
//! - A call survives at most `max_reconnection` consecutive transient failures
//! - The number of dials never exceeds the bound
//! - Non-transient errors never trigger a dial

use crate::support::{self, gone_away, syntax_error, MockServer, Op};
use proptest::prelude::*;
use sql_reconnect::Error;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: success iff failures <= max, with one dial per failure
    #[test]
    fn reconnections_are_bounded(
        max in 0u32..=6,
        failures in 0usize..=8,
    ) {
        let server = MockServer::new();
        let conn = support::connect(&server, max);
        server.fail_times(Op::Exec, failures, gone_away());

        let result = conn.exec("UPDATE t SET a = 1");

        let dials = (failures as u32).min(max);
        prop_assert_eq!(server.connects(), 1 + dials);
        if failures as u32 <= max {
            prop_assert!(result.is_ok());
            prop_assert_eq!(conn.reconnect_attempts(), 0);
        } else {
            match result {
                Err(Error::ExceededMaxReconnection { attempts, .. }) => {
                    prop_assert_eq!(attempts, max);
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
        }
        prop_assert!(conn.reconnect_attempts() <= max);
    }

    /// Property: a non-transient error is returned on the first try, even
    /// after earlier failures were absorbed
    #[test]
    fn non_transient_errors_never_reconnect(
        (max, transient_before) in (0u32..=6)
            .prop_flat_map(|max| (Just(max), 0usize..=max as usize)),
    ) {
        let server = MockServer::new();
        let conn = support::connect(&server, max);
        server.fail_times(Op::Exec, transient_before, gone_away());
        prop_assert!(conn.exec("SELECT 1").is_ok());
        let connects = server.connects();
        let attempts = conn.reconnect_attempts();

        server.fail_next(Op::Exec, syntax_error());
        let result = conn.exec("SELEC 1");

        prop_assert!(matches!(result, Err(Error::Driver(_))));
        prop_assert_eq!(server.connects(), connects);
        prop_assert_eq!(conn.reconnect_attempts(), attempts);
    }

    /// Property: statement recovery obeys the same bound
    #[test]
    fn statement_recreations_are_bounded(
        max in 0u32..=5,
        failures in 0usize..=7,
    ) {
        let server = MockServer::new();
        server.add_numbers("SELECT n FROM numbers", 3);
        let conn = support::connect(&server, max);
        let mut stmt = conn.prepare("SELECT n FROM numbers").unwrap();
        stmt.execute(None).unwrap();
        server.fail_times(Op::Fetch, failures, gone_away());

        let result = stmt.fetch();

        let recreations = (failures as u32).min(max) as usize;
        prop_assert_eq!(server.calls(Op::Prepare), 1 + recreations);
        prop_assert_eq!(result.is_ok(), failures as u32 <= max);
    }
}
