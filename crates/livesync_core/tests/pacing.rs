use livesync_core::{Drained, PacingBuffer};
use pretty_assertions::assert_eq;

fn drain_text(pieces: Vec<Drained>) -> String {
    pieces.into_iter().map(|piece| piece.text).collect()
}

#[test]
fn push_starts_drain_loop_once() {
    let mut buffer = PacingBuffer::new(3);
    assert!(buffer.push(1, "abc"));
    assert!(!buffer.push(1, "def"));
    assert!(buffer.is_draining());
    assert!(!buffer.push(1, ""));
}

#[test]
fn rendered_text_is_always_a_prefix_of_arrival_order() {
    let expected = "abcdef";
    let mut buffer = PacingBuffer::new(1);
    let mut rendered = String::new();

    for chunk in ["ab", "cd", "ef"] {
        buffer.push(1, chunk);
        rendered.push_str(&drain_text(buffer.tick()));
        assert!(expected.starts_with(&rendered), "{rendered:?} is not a prefix");
    }
    while buffer.is_draining() {
        rendered.push_str(&drain_text(buffer.tick()));
        assert!(expected.starts_with(&rendered), "{rendered:?} is not a prefix");
    }

    assert_eq!(rendered, expected);
}

#[test]
fn drain_stops_cleanly_when_empty() {
    let mut buffer = PacingBuffer::new(4);
    buffer.push(1, "hello");

    assert_eq!(drain_text(buffer.tick()), "hell");
    assert!(buffer.is_draining());
    assert_eq!(drain_text(buffer.tick()), "o");
    assert!(!buffer.is_draining());
    assert!(buffer.tick().is_empty());

    // A later push restarts the loop.
    assert!(buffer.push(1, "!"));
}

#[test]
fn message_boundaries_are_never_mixed() {
    let mut buffer = PacingBuffer::new(3);
    buffer.push(1, "abcd");
    buffer.push(2, "xy");

    assert_eq!(
        buffer.tick(),
        vec![Drained {
            message: 1,
            text: "abc".to_string(),
        }]
    );
    assert_eq!(
        buffer.tick(),
        vec![
            Drained {
                message: 1,
                text: "d".to_string(),
            },
            Drained {
                message: 2,
                text: "xy".to_string(),
            },
        ]
    );
    assert!(!buffer.is_draining());
}

#[test]
fn multibyte_text_is_split_on_char_boundaries() {
    let mut buffer = PacingBuffer::new(2);
    buffer.push(7, "héllo ✓");

    let mut rendered = String::new();
    while buffer.is_draining() {
        rendered.push_str(&drain_text(buffer.tick()));
    }
    assert_eq!(rendered, "héllo ✓");
}

#[test]
fn bursty_input_drains_at_constant_rate() {
    let mut buffer = PacingBuffer::new(3);
    let burst = "x".repeat(100);
    assert!(buffer.push(1, &burst));

    let mut ticks = 0;
    let mut rendered = String::new();
    for _ in 0..20 {
        assert!(!buffer.push(1, "y"));
        let piece = drain_text(buffer.tick());
        assert_eq!(piece.chars().count(), 3);
        rendered.push_str(&piece);
        ticks += 1;
    }
    while buffer.is_draining() {
        let piece = drain_text(buffer.tick());
        assert!(piece.chars().count() <= 3);
        rendered.push_str(&piece);
        ticks += 1;
    }

    assert_eq!(ticks, 40);
    assert_eq!(rendered, format!("{burst}{}", "y".repeat(20)));
}

#[test]
fn cancel_discards_buffered_text_immediately() {
    let mut buffer = PacingBuffer::new(3);
    buffer.push(1, &"z".repeat(120));
    buffer.tick();

    assert_eq!(buffer.cancel(), 117);
    assert!(!buffer.is_draining());
    assert!(buffer.tick().is_empty());
    assert_eq!(buffer.pending_chars(), 0);
}

#[test]
fn sealed_buffer_finishes_only_after_draining() {
    let mut buffer = PacingBuffer::new(3);
    buffer.push(1, "abcd");
    buffer.seal();

    assert!(!buffer.is_finished());
    buffer.tick();
    assert!(!buffer.is_finished());
    buffer.tick();
    assert!(buffer.is_finished());
}
