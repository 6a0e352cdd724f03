//! Remote probe commands and the parsers for their output.
//!
//! Parsing is deliberately forgiving: numbers are read from the leading
//! numeric prefix of the output (`"12.5 us,"` reads as 12.5) and anything
//! unreadable becomes zero rather than an error.

pub(crate) const CPU_COMMAND: &str =
    "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | cut -d'%' -f1 || echo '0'";
pub(crate) const MEMORY_COMMAND: &str = "free -b | grep Mem | awk '{print $2, $3}'";
pub(crate) const DISK_COMMAND: &str = "df -B1 / | tail -1 | awk '{print $2, $3}'";
pub(crate) const LOAD_COMMAND: &str = "cat /proc/loadavg | awk '{print $1, $2, $3}'";
pub(crate) const OS_COMMAND: &str =
    "cat /etc/os-release | grep PRETTY_NAME | cut -d'\"' -f2 || uname -s";
pub(crate) const UPTIME_COMMAND: &str = "uptime -p || echo 'Unknown'";
pub(crate) const CPU_MODEL_COMMAND: &str =
    "cat /proc/cpuinfo | grep 'model name' | head -1 | cut -d':' -f2 || echo 'Unknown'";
pub(crate) const CORES_COMMAND: &str = "nproc || grep -c processor /proc/cpuinfo";
pub(crate) const HOSTNAME_COMMAND: &str = "hostname";
pub(crate) const KERNEL_COMMAND: &str = "uname -r";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Longest leading prefix of `s` (after whitespace) that reads as a float.
pub(crate) fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, ch) in s.char_indices() {
        match ch {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + ch.len_utf8();
    }

    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

/// Leading signed integer of `s` (after whitespace).
pub(crate) fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, ch)| !(ch.is_ascii_digit() || (i == 0 && (ch == '+' || ch == '-'))))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

/// CPU utilization from the `top` probe: rounded and clamped to 0-100.
pub(crate) fn parse_cpu(output: &str) -> u32 {
    match leading_float(output) {
        Some(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u32,
        _ => 0,
    }
}

/// `(total, used)` bytes from a `"<total> <used>"` line.
pub(crate) fn parse_total_used(output: &str) -> (u64, u64) {
    let mut parts = output.split_whitespace();
    let mut next = || {
        parts
            .next()
            .and_then(leading_int)
            .map_or(0, |v| v.max(0) as u64)
    };
    let total = next();
    let used = next();
    (total, used)
}

/// `round(used / total * 100)`, 0 when the total is unknown.
pub(crate) fn percent(used: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    ((used as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u32
}

pub(crate) fn to_gib(bytes: u64) -> u64 {
    (bytes as f64 / GIB).round() as u64
}

/// Three load averages; each one independently 0.0 when unreadable.
pub(crate) fn parse_load_average(output: &str) -> [f64; 3] {
    let mut load = [0.0; 3];
    for (slot, part) in load.iter_mut().zip(output.split_whitespace()) {
        *slot = leading_float(part).filter(|v| v.is_finite()).unwrap_or(0.0);
    }
    load
}

/// Core count, at least 1.
pub(crate) fn parse_cores(output: &str) -> u32 {
    match leading_int(output) {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}

/// Trimmed text, `None` when nothing is left.
pub(crate) fn descriptive(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    mod leading_numbers {
        use super::*;

        #[test]
        fn test_leading_float_prefix() {
            assert_eq!(leading_float("12.5 us,"), Some(12.5));
            assert_eq!(leading_float("  3.0"), Some(3.0));
            assert_eq!(leading_float("7%"), Some(7.0));
            assert_eq!(leading_float("-1.5x"), Some(-1.5));
            assert_eq!(leading_float("42."), Some(42.0));
        }

        #[test]
        fn test_leading_float_rejects_non_numbers() {
            assert_eq!(leading_float(""), None);
            assert_eq!(leading_float("abc"), None);
            assert_eq!(leading_float("."), None);
            assert_eq!(leading_float("-"), None);
        }

        #[test]
        fn test_leading_int_prefix() {
            assert_eq!(leading_int("8\n"), Some(8));
            assert_eq!(leading_int("16GB"), Some(16));
            assert_eq!(leading_int("-3"), Some(-3));
            assert_eq!(leading_int("x1"), None);
        }
    }

    mod cpu {
        use super::*;

        #[test]
        fn test_rounds() {
            assert_eq!(parse_cpu("12.5\n"), 13);
            assert_eq!(parse_cpu("12.4"), 12);
        }

        #[test]
        fn test_clamps() {
            assert_eq!(parse_cpu("250"), 100);
            assert_eq!(parse_cpu("-5"), 0);
        }

        #[test]
        fn test_unparsable_is_zero() {
            assert_eq!(parse_cpu(""), 0);
            assert_eq!(parse_cpu("n/a"), 0);
        }
    }

    mod memory_and_disk {
        use super::*;

        #[test]
        fn test_total_used() {
            assert_eq!(
                parse_total_used("16777216000 8388608000\n"),
                (16_777_216_000, 8_388_608_000)
            );
        }

        #[test]
        fn test_missing_fields_are_zero() {
            assert_eq!(parse_total_used(""), (0, 0));
            assert_eq!(parse_total_used("1024"), (1024, 0));
            assert_eq!(parse_total_used("abc def"), (0, 0));
        }

        #[test]
        fn test_percent() {
            assert_eq!(percent(8_388_608_000, 16_777_216_000), 50);
            assert_eq!(percent(1, 3), 33);
            assert_eq!(percent(2, 3), 67);
        }

        #[test]
        fn test_percent_zero_total() {
            assert_eq!(percent(0, 0), 0);
            assert_eq!(percent(500, 0), 0);
        }

        #[test]
        fn test_to_gib_rounds() {
            assert_eq!(to_gib(16 * 1024 * 1024 * 1024), 16);
            assert_eq!(to_gib(1_610_612_736), 2); // 1.5 GiB
            assert_eq!(to_gib(500 * 1024 * 1024), 0);
        }
    }

    mod load_and_descriptive {
        use super::*;

        #[test]
        fn test_load_average() {
            assert_eq!(parse_load_average("0.52 0.58 0.59\n"), [0.52, 0.58, 0.59]);
        }

        #[test]
        fn test_load_average_fields_independent() {
            assert_eq!(parse_load_average("0.52 oops 0.59"), [0.52, 0.0, 0.59]);
            assert_eq!(parse_load_average("1.0"), [1.0, 0.0, 0.0]);
            assert_eq!(parse_load_average(""), [0.0, 0.0, 0.0]);
        }

        #[test]
        fn test_cores_default_to_one() {
            assert_eq!(parse_cores("8\n"), 8);
            assert_eq!(parse_cores(""), 1);
            assert_eq!(parse_cores("0"), 1);
        }

        #[test]
        fn test_descriptive_trims() {
            assert_eq!(
                descriptive("  Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz\n").as_deref(),
                Some("Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz")
            );
            assert_eq!(descriptive("   \n"), None);
        }
    }
}
