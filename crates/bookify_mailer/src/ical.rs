// --- File: crates/bookify_mailer/src/ical.rs ---
//! iCalendar payloads for booking mail.
//!
//! The `UID` of the VEVENT is always the booking uid, so calendar clients
//! collapse confirmation, reschedule and cancellation mails onto one entry.

use chrono::{DateTime, Utc};

/// Invite lifecycle methods understood by calendar clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteMethod {
    Request,
    Cancel,
}

impl InviteMethod {
    fn as_str(&self) -> &'static str {
        match self {
            InviteMethod::Request => "REQUEST",
            InviteMethod::Cancel => "CANCEL",
        }
    }

    fn event_status(&self) -> &'static str {
        match self {
            InviteMethod::Request => "CONFIRMED",
            InviteMethod::Cancel => "CANCELLED",
        }
    }
}

/// Everything the VEVENT needs.
#[derive(Debug, Clone)]
pub struct Invite {
    pub uid: String,
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub organizer_email: Option<String>,
    pub organizer_name: Option<String>,
    pub attendee_email: String,
    pub attendee_name: String,
    pub method: InviteMethod,
    /// Bumped on every mutation of the event (reschedule, cancel).
    pub sequence: u32,
}

pub fn format_ical_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

/// Renders the invite as a VCALENDAR object.
pub fn render(invite: &Invite, now: DateTime<Utc>) -> String {
    let mut ics = String::new();
    ics.push_str("BEGIN:VCALENDAR\r\n");
    ics.push_str("VERSION:2.0\r\n");
    ics.push_str("PRODID:-//Bookify//Scheduling//EN\r\n");
    ics.push_str(&format!("METHOD:{}\r\n", invite.method.as_str()));
    ics.push_str("BEGIN:VEVENT\r\n");
    ics.push_str(&format!("UID:{}\r\n", invite.uid));
    ics.push_str(&format!("DTSTAMP:{}\r\n", format_ical_datetime(&now)));
    ics.push_str(&format!("DTSTART:{}\r\n", format_ical_datetime(&invite.start)));
    ics.push_str(&format!("DTEND:{}\r\n", format_ical_datetime(&invite.end)));
    ics.push_str(&format!("SUMMARY:{}\r\n", escape_text(&invite.summary)));
    if let Some(description) = &invite.description {
        ics.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(description)));
    }
    if let Some(organizer) = &invite.organizer_email {
        let cn = invite.organizer_name.as_deref().unwrap_or(organizer);
        ics.push_str(&format!(
            "ORGANIZER;CN={}:mailto:{}\r\n",
            escape_text(cn),
            organizer
        ));
    }
    ics.push_str(&format!(
        "ATTENDEE;CN={};ROLE=REQ-PARTICIPANT;PARTSTAT=ACCEPTED:mailto:{}\r\n",
        escape_text(&invite.attendee_name),
        invite.attendee_email
    ));
    ics.push_str(&format!("SEQUENCE:{}\r\n", invite.sequence));
    ics.push_str(&format!("STATUS:{}\r\n", invite.method.event_status()));
    ics.push_str("END:VEVENT\r\n");
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn invite() -> Invite {
        Invite {
            uid: "booking-uid-1".to_string(),
            summary: "Intro call".to_string(),
            description: Some("Agenda: roadmap, pricing".to_string()),
            start: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap(),
            organizer_email: Some("host@example.com".to_string()),
            organizer_name: Some("Host Person".to_string()),
            attendee_email: "ada@example.com".to_string(),
            attendee_name: "Ada Lovelace".to_string(),
            method: InviteMethod::Request,
            sequence: 0,
        }
    }

    #[test]
    fn uid_is_the_booking_uid() {
        let ics = render(&invite(), Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
        assert!(ics.contains("UID:booking-uid-1\r\n"));
        assert!(ics.contains("METHOD:REQUEST\r\n"));
        assert!(ics.contains("DTSTART:20240115T140000Z\r\n"));
        assert!(ics.contains("DTEND:20240115T143000Z\r\n"));
        assert!(ics.contains("ORGANIZER;CN=Host Person:mailto:host@example.com\r\n"));
        assert!(ics.contains("ATTENDEE;CN=Ada Lovelace;ROLE=REQ-PARTICIPANT;PARTSTAT=ACCEPTED:mailto:ada@example.com\r\n"));
    }

    #[test]
    fn cancellation_flips_method_and_status() {
        let mut cancel = invite();
        cancel.method = InviteMethod::Cancel;
        cancel.sequence = 1;
        let ics = render(&cancel, Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap());
        assert!(ics.contains("METHOD:CANCEL\r\n"));
        assert!(ics.contains("STATUS:CANCELLED\r\n"));
        assert!(ics.contains("SEQUENCE:1\r\n"));
    }

    #[test]
    fn text_fields_are_escaped() {
        let mut inv = invite();
        inv.summary = "Sales; pricing, and\nnext steps".to_string();
        let ics = render(&inv, Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
        assert!(ics.contains("SUMMARY:Sales\\; pricing\\, and\\nnext steps\r\n"));
    }
}
