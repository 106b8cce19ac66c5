//! Line-number framing
//!
//! Job lines travel as `N<n> <payload>*<checksum>`, the checksum being the
//! XOR of every byte before the `*`.

/// XOR of all bytes in `text`
pub fn checksum(text: &str) -> u8 {
    text.bytes().fold(0, |acc, b| acc ^ b)
}

/// Frame `payload` as line `line_number`
pub fn frame(line_number: u64, payload: &str) -> String {
    seal(format!("N{} {}", line_number, payload))
}

/// Frame that makes the controller expect `next_line` as the next line number
pub fn reset_frame(next_line: u64) -> String {
    seal(format!("N{} M110", next_line as i64 - 1))
}

fn seal(prefix: String) -> String {
    let sum = checksum(&prefix);
    format!("{}*{}", prefix, sum)
}

/// Split a frame into line number, payload and checksum
pub fn split_frame(framed: &str) -> Option<(i64, &str, u8)> {
    let (body, sum) = framed.rsplit_once('*')?;
    let sum = sum.trim().parse::<u8>().ok()?;
    let rest = body.strip_prefix('N')?;
    let (number, payload) = rest.split_once(' ').unwrap_or((rest, ""));
    let number = number.parse::<i64>().ok()?;
    Some((number, payload, sum))
}

/// True when `framed` carries a checksum matching its body
pub fn verify(framed: &str) -> bool {
    match framed.rsplit_once('*') {
        Some((body, sum)) => sum.trim().parse::<u8>().ok() == Some(checksum(body)),
        None => false,
    }
}
