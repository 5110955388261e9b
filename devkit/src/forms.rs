//! Corps `application/x-www-form-urlencoded` pour /register et /login.

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

pub fn encode_pairs(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn register(service_number: &str, full_name: &str, password: &str, device_id: &str) -> String {
    encode_pairs(&[
        ("serviceNumber", service_number),
        ("fullName", full_name),
        ("password", password),
        ("deviceId", device_id),
    ])
}

pub fn login(service_number: &str, password: &str) -> String {
    encode_pairs(&[("serviceNumber", service_number), ("password", password)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding() {
        assert_eq!(login("SN-1", "p@ss word&x"), "serviceNumber=SN-1&password=p%40ss+word%26x");
        assert!(register("SN-1", "Éva Durand", "pw", "WR-1").contains("fullName=%C3%89va+Durand"));
    }
}
