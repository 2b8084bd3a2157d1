use serde::Serialize;

/// The one document a tool prints on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Human-oriented side channel. Never mixed into stdout.
pub fn note(line: &str) {
    eprintln!("# {line}");
}
