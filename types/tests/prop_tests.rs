use proptest::prelude::*;

use kyc_types::{KycSession, SessionId, SessionStatus, SubjectRef, Timestamp};

proptest! {
    /// SessionId roundtrip: any entropy yields an id that parses back unchanged.
    #[test]
    fn session_id_from_entropy_parses(bytes in prop::collection::vec(any::<u8>(), 4..32)) {
        let id = SessionId::from_entropy(&bytes);
        let parsed = SessionId::parse(id.as_str()).unwrap();
        prop_assert_eq!(parsed, id);
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// A session needs expiry exactly when it is non-terminal and now > expires_at.
    #[test]
    fn expiry_boundary(created in 0u64..1_000_000, ttl in 1u64..10_000, offset in 0u64..20_000) {
        let session = KycSession::new(
            SessionId::parse("KYC_00112233445566778899AABBCCDDEEFF").unwrap(),
            SubjectRef::new("APP-1").unwrap(),
            Timestamp::new(created),
            ttl,
        );
        let now = Timestamp::new(created + offset);
        prop_assert_eq!(session.needs_expiry(now), offset > ttl);
    }

    /// Terminal statuses have no outgoing edges.
    #[test]
    fn terminal_statuses_are_sinks(from in 0usize..5, to in 0usize..5) {
        let from = SessionStatus::ALL[from];
        let to = SessionStatus::ALL[to];
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }
}
