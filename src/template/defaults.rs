//! Built-in templates seeded on startup

use serde_json::{Map, Value};

use crate::notification::Channel;

use super::substitution::placeholders;
use super::types::{CreateTemplateRequest, TemplateKind};

pub const WELCOME_EMAIL: &str = "welcome_email";
pub const ORDER_CONFIRMATION_EMAIL: &str = "order_confirmation_email";
pub const PASSWORD_RESET_EMAIL: &str = "password_reset_email";

const WELCOME_HTML: &str = r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333;">Welcome {{user_name}}!</h1>
  <p>Thank you for joining {{platform_name}}. We're excited to have you aboard!</p>
  <p>You can now:</p>
  <ul>
    <li>Browse our product catalog</li>
    <li>Place orders</li>
    <li>Track your shipments</li>
    <li>Manage your account</li>
  </ul>
  <p>If you have any questions, feel free to contact our support team.</p>
  <p>Best regards,<br>The {{platform_name}} Team</p>
</div>"#;

const ORDER_CONFIRMATION_HTML: &str = r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333;">Order Confirmed!</h1>
  <p>Hi {{customer_name}},</p>
  <p>Thank you for your order! Here are the details:</p>
  <div style="background: #f9f9f9; padding: 20px; margin: 20px 0;">
    <h3>Order #{{order_id}}</h3>
    <p><strong>Total: ${{total_amount}}</strong></p>
    <p>Items: {{item_count}}</p>
  </div>
  <p>We'll send you another email when your order ships.</p>
  <p>Best regards,<br>The {{platform_name}} Team</p>
</div>"#;

const PASSWORD_RESET_HTML: &str = r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #333;">Password Reset</h1>
  <p>Hi {{user_name}},</p>
  <p>You requested to reset your password. Click the button below to create a new password:</p>
  <div style="text-align: center; margin: 30px 0;">
    <a href="{{reset_url}}" style="background: #007bff; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; display: inline-block;">
      Reset Password
    </a>
  </div>
  <p>If the button doesn't work, copy and paste this link into your browser:</p>
  <p><a href="{{reset_url}}">{{reset_url}}</a></p>
  <p>This link will expire in 1 hour for security reasons.</p>
  <p>If you didn't request this, please ignore this email.</p>
  <p>Best regards,<br>The {{platform_name}} Team</p>
</div>"#;

/// Definitions of the templates every deployment starts with
pub fn default_templates() -> Vec<CreateTemplateRequest> {
    vec![
        definition(
            WELCOME_EMAIL,
            "Welcome to {{platform_name}}!",
            WELCOME_HTML,
            TemplateKind::Welcome,
            vec![Channel::Email],
        ),
        definition(
            ORDER_CONFIRMATION_EMAIL,
            "Order Confirmation - #{{order_id}}",
            ORDER_CONFIRMATION_HTML,
            TemplateKind::OrderConfirmation,
            vec![Channel::Email, Channel::Sms],
        ),
        definition(
            PASSWORD_RESET_EMAIL,
            "Password Reset Request",
            PASSWORD_RESET_HTML,
            TemplateKind::PasswordReset,
            vec![Channel::Email],
        ),
    ]
}

fn definition(
    name: &str,
    subject: &str,
    html: &str,
    kind: TemplateKind,
    channels: Vec<Channel>,
) -> CreateTemplateRequest {
    CreateTemplateRequest {
        name: name.to_string(),
        subject: subject.to_string(),
        html_content: html.to_string(),
        text_content: None,
        kind,
        channels,
        variables: Some(variable_docs(&[subject, html])),
    }
}

/// `{"var": "string"}` for every placeholder referenced by the given parts
fn variable_docs(parts: &[&str]) -> Value {
    let mut docs = Map::new();
    for part in parts {
        for name in placeholders(part) {
            docs.entry(name)
                .or_insert_with(|| Value::String("string".to_string()));
        }
    }
    Value::Object(docs)
}
