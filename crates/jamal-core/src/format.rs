//! Display helpers for Brazilian phone numbers, postcodes and money.

fn digits(s: &str, max: usize) -> String {
    s.chars().filter(char::is_ascii_digit).take(max).collect()
}

/// `11999990000` → `(11)99999-0000`. Partial input is masked as far as it goes.
pub fn format_phone(raw: &str) -> String {
    let d = digits(raw, 11);
    match d.len() {
        0 => String::new(),
        1..=2 => format!("({d}"),
        n if n <= 6 => format!("({}){}", &d[..2], &d[2..]),
        n => {
            let split = n - 4;
            format!("({}){}-{}", &d[..2], &d[2..split], &d[split..])
        }
    }
}

/// `01234567` → `01234-567`.
pub fn format_cep(raw: &str) -> String {
    let d = digits(raw, 8);
    if d.len() > 5 {
        format!("{}-{}", &d[..5], &d[5..])
    } else {
        d
    }
}

/// `12.5` → `R$ 12,50`.
pub fn format_brl(value: f64) -> String {
    let s = format!("{:.2}", value.abs()).replace('.', ",");
    if value < 0.0 && s != "0,00" {
        format!("-R$ {s}")
    } else {
        format!("R$ {s}")
    }
}

pub fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}

/// Pickup address line shown to drivers.
pub fn pickup_address(street: &str, number: &str, cep: Option<&str>) -> String {
    match cep.map(str::trim).filter(|c| !c.is_empty()) {
        Some(cep) => format!("{}, {}, CEP: {}", street.trim(), number.trim(), format_cep(cep)),
        None => format!("{}, {}", street.trim(), number.trim()),
    }
}
