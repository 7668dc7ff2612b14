//! Fuzz target for replay guard state machine
//!
//! Ensure timestamp monotonicity under arbitrary accept/retune sequences
//!
//! # Strategy
//!
//! - Interleave accepts with window retunes
//! - Timestamps relative to an advancing clock plus absolute extremes
//! - Non-numeric additional data mixed in
//! - Windows from zero through i64::MAX, including negative
//!
//! # Invariants
//!
//! - last_accepted never decreases
//! - An accepted timestamp is strictly newer than the previous one and
//!   inside the window at the moment of acceptance
//! - Rejections leave state untouched
//! - No timestamp is ever accepted twice

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_core::ReplayGuard;

#[derive(Debug, Clone, Arbitrary)]
enum GuardOp {
    Accept { stamp: StampChoice, advance: u16 },
    Retune { window: WindowChoice },
}

#[derive(Debug, Clone, Arbitrary)]
enum StampChoice {
    Now,
    NearNow(i8),
    Absolute(i64),
    Text(String),
}

#[derive(Debug, Clone, Arbitrary)]
enum WindowChoice {
    Zero,
    Small(u8),
    Huge,
    Negative(i16),
}

fuzz_target!(|ops: Vec<GuardOp>| {
    // Drivers feed the guard a wall clock, which never runs backwards and
    // is never negative.
    let mut now: i64 = 1_700_000_000_000;
    let mut guard = ReplayGuard::new(10);
    let mut window: i64 = 10;
    let mut model_last: i64 = 0;

    for op in ops {
        match op {
            GuardOp::Accept { stamp, advance } => {
                now = now.saturating_add(i64::from(advance));
                let data = render_stamp(&stamp, now);
                let before = guard.last_accepted();

                if guard.accept(&data, now) {
                    let Ok(value) = data.parse::<i64>() else {
                        panic!("accepted non-numeric data: {data:?}");
                    };
                    assert!(value > model_last, "accepted {value} after {model_last}");
                    let delta = now - value;
                    assert!(
                        delta >= 0 && delta <= window,
                        "accepted {value} outside window {window} at {now}"
                    );
                    model_last = value;
                } else {
                    assert_eq!(guard.last_accepted(), before, "rejection changed state");
                }
                assert_eq!(guard.last_accepted(), model_last);
            }
            GuardOp::Retune { window: choice } => {
                let value = render_window(&choice);
                guard.set_window(value);
                window = value;
                assert_eq!(guard.window_ms(), value);
                assert_eq!(guard.last_accepted(), model_last, "retune changed replay state");
            }
        }
    }
});

fn render_stamp(choice: &StampChoice, now: i64) -> String {
    match choice {
        StampChoice::Now => now.to_string(),
        StampChoice::NearNow(offset) => now.saturating_add(i64::from(*offset)).to_string(),
        StampChoice::Absolute(value) => value.to_string(),
        StampChoice::Text(text) => text.clone(),
    }
}

fn render_window(choice: &WindowChoice) -> i64 {
    match choice {
        WindowChoice::Zero => 0,
        WindowChoice::Small(v) => i64::from(*v),
        WindowChoice::Huge => i64::MAX,
        WindowChoice::Negative(v) => i64::from(*v).min(-1),
    }
}
