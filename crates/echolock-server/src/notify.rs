//! Delivering a released message to its recipients.
//!
//! Real delivery (email, Matrix, whatever an operator wires up) lives
//! outside this crate — `NotificationSink` is the boundary the release
//! pipeline calls across. A failed delivery to one recipient is logged
//! and does not stop delivery to the others, and does not roll back
//! the release itself; the message is already public on the relays by
//! the time delivery runs.

pub trait NotificationSink {
    fn send(&self, recipient: &str, switch_title: &str, plaintext: &[u8]);
}

/// Default sink: logs that a delivery would happen. Stands in for a
/// real transport until one is configured.
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn send(&self, recipient: &str, switch_title: &str, plaintext: &[u8]) {
        log::info!(
            "delivering released message for '{switch_title}' to {recipient} ({} bytes)",
            plaintext.len()
        );
    }
}

/// Send to every recipient, logging and continuing past individual
/// failures — a sink that can fail reports that via its own logging,
/// since `send` has no error return.
pub fn deliver_to_all(sink: &dyn NotificationSink, recipients: &[String], switch_title: &str, plaintext: &[u8]) {
    if recipients.is_empty() {
        log::warn!("switch '{switch_title}' has no recipients configured — message released with nowhere to deliver it");
        return;
    }
    for recipient in recipients {
        sink.send(recipient, switch_title, plaintext);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingSink {
        sent: RefCell<Vec<String>>,
    }

    impl NotificationSink for RecordingSink {
        fn send(&self, recipient: &str, _switch_title: &str, _plaintext: &[u8]) {
            self.sent.borrow_mut().push(recipient.to_string());
        }
    }

    #[test]
    fn delivers_to_every_recipient() {
        let sink = RecordingSink { sent: RefCell::new(Vec::new()) };
        deliver_to_all(
            &sink,
            &["a@example.com".into(), "b@example.com".into()],
            "sw-1",
            b"secret",
        );
        assert_eq!(*sink.sent.borrow(), vec!["a@example.com", "b@example.com"]);
    }
}
