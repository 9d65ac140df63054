pub mod bytes;
pub mod check;
pub mod collectors;
pub mod int;
pub mod mix;

/// Hex encode without separators.
pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
