//! Mock AT modem for integration testing
//!
//! Reads AT commands line by line on stdin and answers on stdout the way a
//! cellular modem would, without any hardware.

use std::io::{BufRead, BufReader, Write};

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF
        }

        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        for reply in respond(command) {
            send_line(&mut writer, &reply);
        }
    }
}

fn send_line<W: Write>(writer: &mut W, line: &str) {
    writer.write_all(b"\r\n").ok();
    writer.write_all(line.as_bytes()).ok();
    writer.write_all(b"\r\n").ok();
    writer.flush().ok();
}

fn respond(command: &str) -> Vec<String> {
    let upper = command.to_ascii_uppercase();

    // Unsolicited line on demand, echoed verbatim
    if upper.starts_with("AT+URC=") {
        return vec![command["AT+URC=".len()..].to_string()];
    }

    let lines: &[&str] = match upper.as_str() {
        "AT" | "ATE0" => &["OK"],
        "AT+CREG?" => &["+CREG: 1,\"1A2B\",\"4D5E6F\",7", "OK"],
        "AT+CSQ" => &["+CSQ: 23,99", "OK"],
        "AT+CGMI" => &["Quectel", "OK"],
        _ if upper.starts_with("AT+CGDCONT=") => &["OK"],
        _ => &["ERROR"],
    };
    lines.iter().map(|l| l.to_string()).collect()
}
