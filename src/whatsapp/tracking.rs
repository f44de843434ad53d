use once_cell::sync::Lazy;
use regex::Regex;

use crate::orders::{Order, OrderStatus};
use crate::whatsapp::text::{contains_phrase, words};

static ORDER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#?\b(\d{4,6})\b").expect("ORDER_NUMBER regex should compile"));

const TRACKING_KEYWORDS: &[&str] = &[
    "meu pedido",
    "status",
    "rastrear",
    "rastreio",
    "acompanhar",
    "onde esta",
    "cade",
    "ja saiu",
    "saiu para entrega",
    "vai chegar",
    "previsao",
];

/// What the customer asked about an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingIntent {
    /// A number was given, digits only
    Number(String),
    /// Asked about "my order" without a number
    Keywords,
}

/// First 4 to 6 digit number in free text
pub fn extract_order_number(text: &str) -> Option<String> {
    ORDER_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn classify(text: &str) -> Option<TrackingIntent> {
    if let Some(number) = extract_order_number(text) {
        return Some(TrackingIntent::Number(number));
    }
    let w = words(text);
    TRACKING_KEYWORDS
        .iter()
        .any(|keyword| contains_phrase(&w, keyword))
        .then_some(TrackingIntent::Keywords)
}

/// Emoji, label and customer message per status
pub fn status_copy(status: OrderStatus) -> (&'static str, &'static str, &'static str) {
    match status {
        OrderStatus::Pendente => ("🕐", "Pendente", "Recebemos seu pedido e ele logo entra em preparo."),
        OrderStatus::Preparando => ("👨‍🍳", "Em preparo", "Seu pedido está sendo preparado com carinho."),
        OrderStatus::Pronto => ("✅", "Pronto", "Seu pedido está pronto e aguardando o entregador."),
        OrderStatus::SaiuEntrega => ("🛵", "Saiu para entrega", "Seu pedido está a caminho!"),
        OrderStatus::Entregue => ("📦", "Entregue", "Seu pedido foi entregue. Bom apetite!"),
        OrderStatus::Concluido => ("🎉", "Concluído", "Pedido concluído. Obrigado pela preferência!"),
        OrderStatus::Cancelado => ("❌", "Cancelado", "Este pedido foi cancelado. Fale conosco se precisar de ajuda."),
    }
}

pub fn status_reply(order: &Order) -> String {
    let (emoji, label, message) = status_copy(order.status);
    format!(
        "{} *Pedido {}*\nStatus: *{}*\n{}",
        emoji, order.number, label, message
    )
}

pub fn ask_for_number() -> String {
    "Para consultar seu pedido, me envie o número dele (por exemplo: #123456) 😊".to_string()
}

pub fn number_not_found(number: &str) -> String {
    format!(
        "Não encontrei o pedido #{}. Confira o número e me envie novamente, por favor.",
        number
    )
}
