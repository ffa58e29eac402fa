//! Scripted device responders
//!
//! A responder maps one received message to a reply ("" for no reply).
//! Replies carry the terminators a real device would send.

/// Pure request → reply function
pub type Responder = fn(&str) -> String;

pub const ECHO_ADDRESS: (&str, u16) = ("127.0.0.1", 7);
pub const PROJECTOR_ADDRESS: (&str, u16) = ("192.168.1.50", 4352);
pub const DISPLAY_ADDRESS: (&str, u16) = ("192.168.1.60", 9761);

/// Responders installed in every fresh network
pub fn reference_responders() -> Vec<(&'static str, u16, Responder)> {
    vec![
        (ECHO_ADDRESS.0, ECHO_ADDRESS.1, echo as Responder),
        (PROJECTOR_ADDRESS.0, PROJECTOR_ADDRESS.1, projector as Responder),
        (DISPLAY_ADDRESS.0, DISPLAY_ADDRESS.1, display as Responder),
    ]
}

pub fn echo(input: &str) -> String {
    input.to_string()
}

/// Projector control protocol; commands may arrive with a CR/LF tail
pub fn projector(input: &str) -> String {
    let command = input.trim_end_matches(&['\r', '\n'][..]).trim();
    let reply = match command.to_ascii_uppercase().as_str() {
        "PWR ON" => "PWR=ON",
        "PWR OFF" => "PWR=OFF",
        "INPUT HDMI1" => "INPUT=HDMI1",
        "INPUT HDMI2" => "INPUT=HDMI2",
        "INPUT VGA" => "INPUT=VGA",
        "LAMP?" => "LAMP=1234",
        "MUTE ON" => "MUTE=ON",
        "MUTE OFF" => "MUTE=OFF",
        _ => return format!("ERR:UNKNOWN_CMD {}\r\n", command),
    };
    format!("{}\r\n", reply)
}

/// Flat-panel display protocol
pub fn display(input: &str) -> String {
    let command = input.trim_end_matches(&['\r', '\n'][..]).trim();
    let upper = command.to_ascii_uppercase();
    if upper == "POWER ON" || upper == "POWER OFF" {
        return "OK\r".to_string();
    }
    if let Some(level) = upper.strip_prefix("VOLUME ")
        && !level.is_empty()
        && level.chars().all(|c| c.is_ascii_digit())
    {
        return format!("VOLUME={}\r", level);
    }
    if let Some(input) = upper.strip_prefix("INPUT ")
        && !input.trim().is_empty()
    {
        return "OK\r".to_string();
    }
    "ERR\r".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projector_table() {
        assert_eq!(projector("PWR ON"), "PWR=ON\r\n");
        assert_eq!(projector("PWR OFF\r\n"), "PWR=OFF\r\n");
        assert_eq!(projector("INPUT HDMI2\r"), "INPUT=HDMI2\r\n");
        assert_eq!(projector("LAMP?"), "LAMP=1234\r\n");
        assert_eq!(projector("MUTE ON"), "MUTE=ON\r\n");
        assert_eq!(projector("JUMP\r\n"), "ERR:UNKNOWN_CMD JUMP\r\n");
    }

    #[test]
    fn test_display_table() {
        assert_eq!(display("POWER ON\r"), "OK\r");
        assert_eq!(display("VOLUME 30"), "VOLUME=30\r");
        assert_eq!(display("VOLUME loud"), "ERR\r");
        assert_eq!(display("INPUT 3"), "OK\r");
        assert_eq!(display("DANCE"), "ERR\r");
    }

    #[test]
    fn test_echo_and_registry() {
        assert_eq!(echo("ping\r\n"), "ping\r\n");
        let table = reference_responders();
        assert_eq!(table.len(), 3);
        assert!(table.iter().any(|(addr, port, _)| *addr == "192.168.1.50" && *port == 4352));
    }
}
