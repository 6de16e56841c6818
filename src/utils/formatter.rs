// Formatters - 바이트 크기를 사람이 읽기 쉬운 문자열로 변환

const DECIMAL_SYMBOLS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
const BINARY_SYMBOLS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// SI 단위(1000 배수)로 크기 포맷팅
///
/// # Examples
/// ```
/// use ioutils::utils::formatter::decimal;
///
/// assert_eq!(decimal(999), "999 B");
/// assert_eq!(decimal(1500), "1.5 kB");
/// assert_eq!(decimal(-1_000_000), "-1.0 MB");
/// ```
pub fn decimal(bytes: i64) -> String {
    format_size(bytes, 1000, &DECIMAL_SYMBOLS)
}

/// 이진 단위(1024 배수)로 크기 포맷팅
///
/// # Examples
/// ```
/// use ioutils::utils::formatter::binary;
///
/// assert_eq!(binary(1023), "1023 B");
/// assert_eq!(binary(1536), "1.5 KiB");
/// ```
pub fn binary(bytes: i64) -> String {
    format_size(bytes, 1024, &BINARY_SYMBOLS)
}

fn format_size(bytes: i64, divisor: u64, symbols: &[&str; 7]) -> String {
    // |i64::MIN| 은 i64 범위를 넘으므로 최댓값으로 고정
    let abs = if bytes == i64::MIN {
        i64::MAX as u64
    } else {
        bytes.unsigned_abs()
    };

    if abs < divisor {
        return format!("{} {}", bytes, symbols[0]);
    }

    let sign = if bytes < 0 { "-" } else { "" };
    let last = symbols.len() - 1;
    let mut unit = 1u128;

    for symbol in &symbols[1..last] {
        unit *= u128::from(divisor);
        // 소수 첫째 자리에서 반올림했을 때 divisor 에 닿으면 다음 단위로 넘긴다.
        // abs < unit * (divisor - 0.05)  <=>  20 * abs < unit * (20 * divisor - 1)
        if u128::from(abs) * 20 < unit * (u128::from(divisor) * 20 - 1) {
            return format!("{}{:.1} {}", sign, abs as f64 / unit as f64, symbol);
        }
    }

    unit *= u128::from(divisor);
    format!("{}{:.1} {}", sign, abs as f64 / unit as f64, symbols[last])
}
