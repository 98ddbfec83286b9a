//! Mail bodies.
use super::Mail;
use crate::domain::aggregates::{Order, RefundImage};
use crate::services::summary::SummaryReport;

const BRAND: &str = "Kumbukkal Pepper Nursery";

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: auto; padding: 20px; background-color: #f9f9f9; border-radius: 10px; border: 1px solid #e0e0e0; color: #1F2937;">
<h2 style="color: #111827; text-align: center;">{title}</h2>
{body}
<hr style="border: none; border-top: 1px solid #111827; margin: 20px 0;">
<p style="text-align: center; font-size: 12px; color: #111827;">{BRAND}</p>
</div>"#,
        title = escape(title),
    )
}

fn rows(pairs: &[(&str, String)]) -> String {
    let cells: String = pairs
        .iter()
        .map(|(label, value)| format!("<tr><td><strong>{label}:</strong></td><td>{}</td></tr>", escape(value)))
        .collect();
    format!("<table cellpadding=\"6\">{cells}</table>")
}

fn order_rows(order: &Order) -> String {
    rows(&[
        ("Order ID", order.order_code().to_string()),
        ("Customer Name", order.full_name().to_string()),
        ("Email", order.email().to_string()),
        ("Phone", order.phone().to_string()),
        ("Product", order.product_name().unwrap_or("-").to_string()),
        ("Quantity", order.quantity().to_string()),
        ("Total Amount", order.total().format_inr()),
        ("Delivery Location", order.delivery_location().unwrap_or("-").to_string()),
        ("Delivery Address", order.delivery_address().to_string()),
        ("Delivery Date", order.delivery_date().format("%d %B %Y").to_string()),
        ("Payment Method", order.payment_method().map_or("-".to_string(), |m| format!("{m:?}"))),
        ("Payment Status", order.status().to_string()),
    ])
}

pub fn otp(to: &str, code: &str) -> Mail {
    let body = format!(
        "<p>Please use the following One-Time Password (OTP) to verify your identity and reset your password.</p>\
         <p>This OTP is valid only for <strong>5 minutes</strong>.</p>\
         <p style=\"text-align: center; font-size: 24px; font-weight: bold;\">{}</p>\
         <p style=\"font-size: 12px; color: #999;\">If you did not request this, please ignore this email.</p>",
        escape(code)
    );
    Mail::new(to, "OTP for Password Recovery", layout("Password Recovery OTP", &body))
}

pub struct ContactMessage<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub message: &'a str,
}

pub fn contact_to_admin(admin: &str, contact: &ContactMessage<'_>) -> Mail {
    let mut pairs = vec![("Name", contact.name.to_string()), ("Email", contact.email.to_string())];
    if let Some(phone) = contact.phone { pairs.push(("Phone/WhatsApp", phone.to_string())); }
    pairs.push(("Message", contact.message.to_string()));
    Mail::new(admin, "New Contact Form Submission", layout("New Contact Form Submission", &rows(&pairs)))
}

pub fn contact_thank_you(contact: &ContactMessage<'_>) -> Mail {
    let body = "<p>We have received your message and our team will get back to you shortly.</p>";
    Mail::new(
        contact.email,
        format!("Thank You for Contacting {BRAND}"),
        layout(&format!("Thank You, {}!", contact.name), body),
    )
}

pub fn new_order_to_admin(admin: &str, order: &Order) -> Mail {
    Mail::new(admin, format!("New Order Received - {}", order.order_code()), layout("New Order Received", &order_rows(order)))
}

pub fn order_confirmation(order: &Order) -> Mail {
    let body = format!(
        "<p>Dear {}, thank you for your order. Your payment has been received and your plants are being allocated.</p>{}",
        escape(order.full_name()),
        order_rows(order)
    );
    Mail::new(order.email(), format!("Thank You for Your Order - {}", order.order_code()), layout("Order Confirmed", &body))
}

pub fn refund_request_to_admin(admin: &str, order: &Order, reason: Option<&str>, images: &[RefundImage]) -> Mail {
    let links: String = images
        .iter()
        .map(|img| format!("<li><a href=\"{0}\">{0}</a></li>", escape(&img.url)))
        .collect();
    let body = format!(
        "{}<p><strong>Reason:</strong> {}</p>{}",
        order_rows(order),
        escape(reason.unwrap_or("Not provided")),
        if links.is_empty() { String::new() } else { format!("<p><strong>Images:</strong></p><ul>{links}</ul>") }
    );
    Mail::new(admin, format!("Refund Requested - {}", order.order_code()), layout("Refund Request", &body))
}

pub fn summary(admin: &str, report: &SummaryReport) -> Mail {
    let period = format!("{} - {}", report.start.format("%B %-d, %Y"), report.end.format("%B %-d, %Y"));
    let body = rows(&[
        ("Visitors", report.visitors.to_string()),
        ("Orders", report.orders.to_string()),
        ("Total Revenue", report.revenue.format_inr()),
        ("Pending Revenue", report.pending_revenue.format_inr()),
    ]);
    Mail::new(
        admin,
        format!("{BRAND} - {} Summary Report ({period})", report.period.label()),
        layout(&format!("{} Summary", report.period.label()), &body),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::paid;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_order_mails_carry_code_and_amount() {
        let order = paid();
        let mail = new_order_to_admin("admin@example.com", &order);
        assert_eq!(mail.to, "admin@example.com");
        assert_eq!(mail.subject, "New Order Received - KP2025-0001");
        assert!(mail.html.contains("₹500.00"));
        assert_eq!(order_confirmation(&order).to, "anil@example.com");
    }

    #[test]
    fn test_contact_mail_escapes_message() {
        let contact = ContactMessage { name: "Ravi", email: "ravi@example.com", phone: None, message: "<script>" };
        let mail = contact_to_admin("admin@example.com", &contact);
        assert!(mail.html.contains("&lt;script&gt;"));
        assert!(!mail.html.contains("Phone/WhatsApp"));
    }

    #[test]
    fn test_otp_mail() {
        let mail = otp("u@example.com", "123456");
        assert!(mail.html.contains("123456"));
        assert_eq!(mail.subject, "OTP for Password Recovery");
    }
}
