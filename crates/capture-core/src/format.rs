const SI_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const IEC_UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Render a byte count for humans, e.g. `1.5 MiB`.
/// Plain bytes have no decimals; larger units keep one.
pub fn pretty_file_size(bytes: u64, si: bool) -> String {
    let (mult, units) = if si {
        (1000.0, &SI_UNITS)
    } else {
        (1024.0, &IEC_UNITS)
    };
    let mut value = bytes as f64;
    let mut index = 0;
    while value >= mult && index < units.len() - 1 {
        value /= mult;
        index += 1;
    }
    if index == 0 {
        format!("{value:.0} {}", units[index])
    } else {
        format!("{value:.1} {}", units[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_have_no_decimals() {
        assert_eq!(pretty_file_size(0, false), "0 B");
        assert_eq!(pretty_file_size(1023, false), "1023 B");
    }

    #[test]
    fn iec_units() {
        assert_eq!(pretty_file_size(1024, false), "1.0 KiB");
        assert_eq!(pretty_file_size(1536 * 1024, false), "1.5 MiB");
        assert_eq!(pretty_file_size(4 * 1024 * 1024 * 1024, false), "4.0 GiB");
    }

    #[test]
    fn si_units() {
        assert_eq!(pretty_file_size(1000, true), "1.0 kB");
        assert_eq!(pretty_file_size(2_500_000, true), "2.5 MB");
    }

    #[test]
    fn largest_value_stays_in_range() {
        assert!(pretty_file_size(u64::MAX, false).ends_with("EiB"));
    }
}
