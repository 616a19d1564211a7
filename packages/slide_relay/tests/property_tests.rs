use proptest::prelude::*;

use slide_relay::id::{IdGenerator, ShortIdGenerator};
use slide_relay::protocol::{Command, ScrollDirection, decode_frame};
use slide_relay::session::{Session, SlideState};

// --- Slide navigation ---

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Next),
        Just(Command::Previous),
        (-20i64..40).prop_map(|index| Command::Goto { index }),
        Just(Command::Scroll {
            direction: ScrollDirection::Down
        }),
        any::<Option<bool>>().prop_map(|toggle| Command::Presenter { toggle }),
    ]
}

fn session_at(current: usize, total: usize) -> Session {
    let mut session = Session::new("s1".into(), "host".into());
    session.apply_update(current, total);
    session
}

proptest! {
    #[test]
    fn navigation_stays_in_range(
        current in 0usize..30,
        total in 1usize..30,
        commands in proptest::collection::vec(arb_command(), 0..50),
    ) {
        let mut session = session_at(current, total);
        for command in &commands {
            let state = session.apply_command(command);
            prop_assert!(state.current_slide < total);
            prop_assert_eq!(state.total_slides, total);
        }
    }

    #[test]
    fn next_previous_follow_clamping_law(current in 0usize..30, total in 1usize..30) {
        let start = session_at(current, total).slide_state().current_slide;

        let mut session = session_at(current, total);
        let next = session.apply_command(&Command::Next).current_slide;
        prop_assert_eq!(next, (start + 1).min(total - 1));

        let mut session = session_at(current, total);
        let prev = session.apply_command(&Command::Previous).current_slide;
        prop_assert_eq!(prev, start.saturating_sub(1));
    }

    #[test]
    fn goto_clamps(total in 1usize..30, index in -100i64..100) {
        let mut session = session_at(0, total);
        let state = session.apply_command(&Command::Goto { index });
        let expected = if index < 0 { 0 } else { (index as usize).min(total - 1) };
        prop_assert_eq!(state.current_slide, expected);
    }

    #[test]
    fn empty_deck_never_moves(commands in proptest::collection::vec(arb_command(), 0..20)) {
        let mut session = Session::new("s1".into(), "host".into());
        for command in &commands {
            prop_assert_eq!(
                session.apply_command(command),
                SlideState { current_slide: 0, total_slides: 0 }
            );
        }
    }

    #[test]
    fn update_is_idempotent(current in 0usize..60, total in 0usize..30) {
        let mut session = Session::new("s1".into(), "host".into());
        let once = session.apply_update(current, total);
        let twice = session.apply_update(current, total);
        prop_assert_eq!(once, twice);
        prop_assert_eq!(once.total_slides, total);
    }
}

// --- Session ids ---

proptest! {
    #[test]
    fn ids_have_requested_shape(length in 1usize..24) {
        let id = ShortIdGenerator::new(length).generate();
        prop_assert_eq!(id.len(), length);
        prop_assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}

// --- Frame decoding ---

proptest! {
    #[test]
    fn decode_never_panics(text in ".*") {
        let _ = decode_frame(&text);
    }

    #[test]
    fn decode_keeps_ack_on_unknown_events(event in "[a-z]{1,12}", ack in any::<u64>()) {
        let text = format!(r#"{{"event":"{event}","ack":{ack}}}"#);
        let err = decode_frame(&text).unwrap_err();
        prop_assert_eq!(err.ack, Some(ack));
    }
}
