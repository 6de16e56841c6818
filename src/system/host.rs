//! 호스트 정보

use sysinfo::Networks;

/// 첫 번째 네트워크 인터페이스(이름순)의 MAC 주소
///
/// 각 옥텟을 대문자 16진수 두 자리로 쓰고 `separator` 로 잇는다.
/// 하드웨어 주소가 있는 인터페이스가 없으면 `None`.
pub fn mac_address(separator: &str) -> Option<String> {
    let networks = Networks::new_with_refreshed_list();

    let mut interfaces: Vec<_> = networks.list().iter().collect();
    interfaces.sort_by(|(a, _), (b, _)| a.cmp(b));

    interfaces
        .into_iter()
        .map(|(_, data)| data.mac_address())
        .find(|mac| !mac.is_unspecified())
        .map(|mac| format_mac(&mac.0, separator))
}

fn format_mac(octets: &[u8], separator: &str) -> String {
    octets
        .iter()
        .map(|octet| format!("{octet:02X}"))
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mac() {
        let octets = [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0xFE];
        assert_eq!(format_mac(&octets, ":"), "00:1A:2B:3C:4D:FE");
        assert_eq!(format_mac(&octets, ""), "001A2B3C4DFE");
    }

    #[test]
    fn test_mac_address_shape() {
        // 인터페이스가 없는 환경에서는 None 이 정상
        if let Some(mac) = mac_address("-") {
            assert_eq!(mac.len(), 17);
            assert_eq!(mac.split('-').count(), 6);
            assert!(mac.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
        }
    }
}
