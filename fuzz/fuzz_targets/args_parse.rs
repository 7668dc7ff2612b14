//! Fuzz target for helper launch argument parsing
//!
//! Hosts render `-key=value` arguments from their own configuration and the
//! helper parses them verbatim. This fuzzer tests parsing with:
//! - Keys without values, values without keys
//! - Repeated and conflicting arguments (last one must win)
//! - Control characters and multi-byte text in values
//! - Numeric overflow in -port and -pid
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_helper::parse_args;

fuzz_target!(|args: Vec<String>| {
    match parse_args(&args) {
        Ok(parsed) => {
            // Success means every argument was well-shaped and only known
            // keys appeared.
            for arg in &args {
                let Some((key, _)) = key_value(arg) else {
                    panic!("accepted malformed argument: {arg:?}");
                };
                assert!(matches!(key, "addr" | "port" | "pid" | "token"), "unknown key {key:?}");
            }

            // Later arguments override earlier ones.
            let last_port = last_value(&args, "port");
            match last_port.map(str::parse::<u16>) {
                Some(Ok(port)) => assert_eq!(parsed.port, port),
                _ => panic!("parse succeeded without a numeric -port"),
            }
            match last_value(&args, "token") {
                Some(token) => assert_eq!(parsed.token, token),
                None => panic!("parse succeeded without -token"),
            }
        }
        Err(error) => {
            // Error text feeds the usage message; rendering must not panic.
            let _ = error.to_string();
        }
    }
});

fn key_value(arg: &str) -> Option<(&str, &str)> {
    let stripped = arg.strip_prefix('-')?;
    let stripped = stripped.strip_prefix('-').unwrap_or(stripped);
    stripped.split_once('=')
}

fn last_value<'a>(args: &'a [String], wanted: &str) -> Option<&'a str> {
    args.iter().rev().find_map(|arg| match key_value(arg) {
        Some((key, value)) if key == wanted => Some(value),
        _ => None,
    })
}
