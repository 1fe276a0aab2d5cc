//! Delivery status notifications (RFC 3464) and feedback reports (RFC 5965).
//!
//! Both arrive as `message/*` parts, so the parser already hands them over
//! as a sub-message. For `message/delivery-status` the sub-message header
//! is the per-message block and its body holds one header block per
//! recipient, separated by blank lines.

use crate::error::Result;
use crate::header::{Header, HeaderLimits};
use crate::message::Message;

const DELIVERY_STATUS: &str = "message/delivery-status";
const FEEDBACK_REPORT: &str = "message/feedback-report";

impl Message {
    fn is_report_of(&self, media_type: &str) -> bool {
        self.sub_message().is_some()
            && self
                .header
                .content_type()
                .is_ok_and(|(found, _)| found == media_type)
    }

    /// Reports whether this node is `message/delivery-status` with a parsed
    /// sub-message.
    pub fn has_delivery_status_message(&self) -> bool {
        self.is_report_of(DELIVERY_STATUS)
    }

    /// Reports whether this node is `message/feedback-report` with a parsed
    /// sub-message.
    pub fn has_feedback_report_message(&self) -> bool {
        self.is_report_of(FEEDBACK_REPORT)
    }

    /// The per-message DSN fields (Reporting-MTA, Arrival-Date, ...).
    pub fn delivery_status_message_dsn(&self) -> Option<&Header> {
        if !self.has_delivery_status_message() {
            return None;
        }
        self.sub_message().map(|dsn| &dsn.header)
    }

    /// The per-recipient DSN blocks, in order.
    ///
    /// Returns an empty list if this node is not a delivery status.
    /// A block that does not parse as a header fails the whole call.
    ///
    /// # Examples
    ///
    /// ```
    /// # async fn example() -> tokio_email::Result<()> {
    /// let raw = b"Content-Type: message/delivery-status\r\n\r\n\
    /// Reporting-MTA: dns; mx.example.com\r\n\r\n\
    /// Final-Recipient: rfc822; a@example.com\r\nAction: failed\r\n\r\n\
    /// Final-Recipient: rfc822; b@example.com\r\nAction: delayed\r\n";
    /// let message = tokio_email::parse_message(&raw[..]).await?;
    ///
    /// let recipients = message.delivery_status_recipient_dsn().await?;
    /// assert_eq!(recipients.len(), 2);
    /// assert_eq!(recipients[1].get("Action"), "delayed");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn delivery_status_recipient_dsn(&self) -> Result<Vec<Header>> {
        let Some(body) = self
            .sub_message()
            .filter(|_| self.has_delivery_status_message())
            .and_then(Message::body)
        else {
            return Ok(Vec::new());
        };

        let limits = HeaderLimits::default();
        let mut blocks = Vec::new();
        let mut rest = body;
        loop {
            while let Some(stripped) = rest
                .strip_prefix(b"\r\n")
                .or_else(|| rest.strip_prefix(b"\n"))
            {
                rest = stripped;
            }
            if rest.is_empty() {
                break;
            }
            let block = Header::read_from(&mut rest, &limits).await?;
            if !block.is_empty() {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;

    const BOUNCE: &[u8] = b"Content-Type: multipart/report; report-type=delivery-status; boundary=R\r\n\
\r\n\
--R\r\n\
Content-Type: text/plain\r\n\
\r\n\
Delivery failed.\r\n\
--R\r\n\
Content-Type: message/delivery-status\r\n\
\r\n\
Reporting-MTA: dns; mx.example.com\r\n\
Arrival-Date: Mon, 2 Jan 2023 10:00:00 +0000\r\n\
\r\n\
Final-Recipient: rfc822; gone@example.com\r\n\
Action: failed\r\n\
Status: 5.1.1\r\n\
\r\n\
\r\n\
Final-Recipient: rfc822; slow@example.com\r\n\
Action: delayed\r\n\
Status: 4.4.7\r\n\
--R--\r\n";

    #[tokio::test]
    async fn test_delivery_status() {
        let message = parse_message(BOUNCE).await.unwrap();
        let status = message.messages_with_content_type_prefix(DELIVERY_STATUS);
        assert_eq!(status.len(), 1);
        let status = status[0];
        assert!(status.has_delivery_status_message());
        assert!(!status.has_feedback_report_message());

        let dsn = status.delivery_status_message_dsn().unwrap();
        assert_eq!(dsn.get("Reporting-MTA"), "dns; mx.example.com");

        let recipients = status.delivery_status_recipient_dsn().await.unwrap();
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].get("Status"), "5.1.1");
        assert_eq!(recipients[1].get("Final-Recipient"), "rfc822; slow@example.com");
    }

    #[tokio::test]
    async fn test_not_a_report() {
        let message = parse_message(BOUNCE).await.unwrap();
        assert!(!message.has_delivery_status_message());
        assert!(message.delivery_status_message_dsn().is_none());
        assert!(message.delivery_status_recipient_dsn().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_report() {
        let raw = b"Content-Type: message/feedback-report\r\n\r\n\
Feedback-Type: abuse\r\nUser-Agent: SomeGenerator/1.0\r\nVersion: 1\r\n";
        let message = parse_message(&raw[..]).await.unwrap();
        assert!(message.has_feedback_report_message());
        assert_eq!(message.sub_message().unwrap().header.get("Feedback-Type"), "abuse");
    }

    #[tokio::test]
    async fn test_malformed_recipient_block() {
        let raw = b"Content-Type: message/delivery-status\r\n\r\n\
Reporting-MTA: dns; mx\r\n\r\nnot a field\r\n";
        let message = parse_message(&raw[..]).await.unwrap();
        let err = message.delivery_status_recipient_dsn().await.unwrap_err();
        assert!(matches!(err, crate::Error::MalformedHeader(_)));
    }
}
