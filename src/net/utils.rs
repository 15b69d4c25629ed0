use anyhow::{Result, anyhow};

pub fn my_name() -> Result<String> {
    Ok(hostname::get()?.to_string_lossy().to_string())
}

/// Parses a byte size as given on the command line.
/// Handles forms like:
/// - 1048576
/// - 8MiB, 32KiB, 1GiB (powers of 1024)
/// - 10MB, 4KB (powers of 1000)
/// - 8M, 32K (treated as binary units)
pub fn parse_size(size: &str) -> Result<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(size.len());
    let (digits, unit) = size.split_at(split);
    if digits.is_empty() {
        return Err(anyhow!("size {:?} does not start with a number", size));
    }
    let value: u64 = digits.parse()?;

    let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kib" => 1 << 10,
        "m" | "mib" => 1 << 20,
        "g" | "gib" => 1 << 30,
        "kb" => 1_000,
        "mb" => 1_000_000,
        "gb" => 1_000_000_000,
        other => return Err(anyhow!("unknown size unit {:?}", other)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("size {:?} overflows", size))
}

/// Joins a host and port, bracketing bare IPv6 literals.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
