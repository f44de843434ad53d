// Complaint intake
//
// Per-phone state machine: NONE -> COLLECTING(category -> description ->
// confirmation) -> NONE. State lives in memory only and expires after 30
// minutes of silence; the finished complaint is persisted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::StoreError;
use crate::whatsapp::text::{contains_phrase, words};
use crate::whatsapp::tracking::extract_order_number;

/// Idle time after which an unfinished complaint is forgotten
pub const COMPLAINT_STATE_TTL_MINUTES: i64 = 30;

const COMPLAINT_LEXICON: &[&str] = &[
    "reclamacao",
    "reclamar",
    "reclamando",
    "problema",
    "atrasado",
    "atrasou",
    "atraso",
    "demorou",
    "demorando",
    "veio errado",
    "pedido errado",
    "veio faltando",
    "faltou",
    "frio",
    "fria",
    "estragado",
    "estragada",
    "cru",
    "crua",
    "pessimo",
    "pessima",
    "horrivel",
    "insatisfeito",
    "insatisfeita",
    "cabelo",
    "reembolso",
];

const EXIT_WORDS: &[&str] = &["cancelar", "sair"];
const YES_WORDS: &[&str] = &["sim", "s", "confirmo", "confirmar", "isso", "ok"];
const NO_WORDS: &[&str] = &["nao", "n"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    Atraso,
    PedidoErrado,
    Qualidade,
    Atendimento,
    Outro,
}

impl ComplaintCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::Atraso => "atraso",
            ComplaintCategory::PedidoErrado => "pedido_errado",
            ComplaintCategory::Qualidade => "qualidade",
            ComplaintCategory::Atendimento => "atendimento",
            ComplaintCategory::Outro => "outro",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ComplaintCategory::Atraso => "Atraso na entrega",
            ComplaintCategory::PedidoErrado => "Pedido errado ou incompleto",
            ComplaintCategory::Qualidade => "Qualidade da comida",
            ComplaintCategory::Atendimento => "Atendimento",
            ComplaintCategory::Outro => "Outro",
        }
    }

    /// Menu number ("1".."5") or a word of the label
    fn parse(text: &str) -> Option<Self> {
        let w = words(text);
        let first = w.first()?;
        let by_number = match first.as_str() {
            "1" => Some(ComplaintCategory::Atraso),
            "2" => Some(ComplaintCategory::PedidoErrado),
            "3" => Some(ComplaintCategory::Qualidade),
            "4" => Some(ComplaintCategory::Atendimento),
            "5" => Some(ComplaintCategory::Outro),
            _ => None,
        };
        by_number.or_else(|| {
            if contains_phrase(&w, "atraso") || contains_phrase(&w, "demora") {
                Some(ComplaintCategory::Atraso)
            } else if contains_phrase(&w, "errado") || contains_phrase(&w, "incompleto") {
                Some(ComplaintCategory::PedidoErrado)
            } else if contains_phrase(&w, "qualidade") || contains_phrase(&w, "comida") {
                Some(ComplaintCategory::Qualidade)
            } else if contains_phrase(&w, "atendimento") {
                Some(ComplaintCategory::Atendimento)
            } else if contains_phrase(&w, "outro") {
                Some(ComplaintCategory::Outro)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    Category,
    Description { category: ComplaintCategory },
    Confirmation { category: ComplaintCategory, description: String },
}

#[derive(Debug, Clone)]
struct ComplaintState {
    stage: Stage,
    updated_at: DateTime<Utc>,
}

/// Complaint ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintDraft {
    pub phone: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub order_number: Option<String>,
}

/// Result of feeding one message into an open complaint
#[derive(Debug, Clone, PartialEq)]
pub enum ComplaintStep {
    /// Still collecting; send this prompt
    Reply(String),
    /// The customer gave up; send this and forget the state
    Abandoned(String),
    /// All fields collected and confirmed
    Completed(ComplaintDraft),
}

/// True when the text reads like a complaint
pub fn detect_complaint(text: &str) -> bool {
    let w = words(text);
    COMPLAINT_LEXICON.iter().any(|phrase| contains_phrase(&w, phrase))
}

pub fn offer_prompt() -> String {
    "Sinto muito pelo transtorno 😔 Vou registrar sua reclamação.\n\
     Qual é o tipo do problema?\n\
     1️⃣ Atraso na entrega\n\
     2️⃣ Pedido errado ou incompleto\n\
     3️⃣ Qualidade da comida\n\
     4️⃣ Atendimento\n\
     5️⃣ Outro\n\n\
     Digite *cancelar* a qualquer momento para sair."
        .to_string()
}

pub fn acknowledgment(draft: &ComplaintDraft) -> String {
    match &draft.order_number {
        Some(number) => format!(
            "✅ Sua reclamação sobre o pedido #{} foi registrada. Nossa equipe vai analisar e retornar em breve.",
            number
        ),
        None => "✅ Sua reclamação foi registrada. Nossa equipe vai analisar e retornar em breve.".to_string(),
    }
}

/// Open complaints keyed by phone
#[derive(Default)]
pub struct ComplaintFlow {
    states: DashMap<String, ComplaintState>,
}

impl ComplaintFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the phone has an unexpired complaint in progress
    #[cfg(test)]
    fn is_open(&self, phone: &str, now: DateTime<Utc>) -> bool {
        self.live_state(phone, now).is_some()
    }

    /// Start collecting for this phone and return the offer prompt
    pub fn open(&self, phone: &str, now: DateTime<Utc>) -> String {
        self.states.insert(
            phone.to_string(),
            ComplaintState {
                stage: Stage::Category,
                updated_at: now,
            },
        );
        offer_prompt()
    }

    /// Feed a message into the phone's complaint; `None` when none is open
    pub fn advance(&self, phone: &str, text: &str, now: DateTime<Utc>) -> Option<ComplaintStep> {
        let state = self.live_state(phone, now)?;
        let w = words(text);

        if w.len() == 1 && EXIT_WORDS.contains(&w[0].as_str()) {
            self.states.remove(phone);
            return Some(ComplaintStep::Abandoned(
                "Tudo bem, cancelei o registro da reclamação. Se precisar, é só chamar! 🙂".to_string(),
            ));
        }

        let (next, step) = match state.stage {
            Stage::Category => match ComplaintCategory::parse(text) {
                Some(category) => (
                    Some(Stage::Description { category }),
                    ComplaintStep::Reply(format!(
                        "Entendi: *{}*. Conte com detalhes o que aconteceu (se souber, informe o número do pedido).",
                        category.label()
                    )),
                ),
                None => (
                    Some(Stage::Category),
                    ComplaintStep::Reply("Não entendi 🤔 Responda com o número da opção, de 1 a 5.".to_string()),
                ),
            },
            Stage::Description { category } => {
                let description = text.trim().to_string();
                if description.is_empty() {
                    (
                        Some(Stage::Description { category }),
                        ComplaintStep::Reply("Por favor, descreva o que aconteceu.".to_string()),
                    )
                } else {
                    let prompt = format!(
                        "Confira sua reclamação:\n*Tipo:* {}\n*Descrição:* {}\n\nConfirma o registro? (sim/não)",
                        category.label(),
                        description
                    );
                    (
                        Some(Stage::Confirmation { category, description }),
                        ComplaintStep::Reply(prompt),
                    )
                }
            }
            Stage::Confirmation { category, description } => {
                let answer = w.first().map(String::as_str).unwrap_or_default();
                if YES_WORDS.contains(&answer) {
                    let order_number = extract_order_number(&description);
                    (
                        None,
                        ComplaintStep::Completed(ComplaintDraft {
                            phone: phone.to_string(),
                            category,
                            description,
                            order_number,
                        }),
                    )
                } else if NO_WORDS.contains(&answer) {
                    (
                        None,
                        ComplaintStep::Abandoned(
                            "Certo, não registrei a reclamação. Se quiser, é só me contar novamente.".to_string(),
                        ),
                    )
                } else {
                    (
                        Some(Stage::Confirmation { category, description }),
                        ComplaintStep::Reply("Responda *sim* para registrar ou *não* para descartar.".to_string()),
                    )
                }
            }
        };

        match next {
            Some(stage) => {
                self.states.insert(phone.to_string(), ComplaintState { stage, updated_at: now });
            }
            None => {
                self.states.remove(phone);
            }
        }
        Some(step)
    }

    /// Drop every state idle for longer than the TTL
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.states.retain(|_, state| !is_expired(state, now));
    }

    fn live_state(&self, phone: &str, now: DateTime<Utc>) -> Option<ComplaintState> {
        let state = self.states.get(phone).map(|entry| entry.value().clone())?;
        if is_expired(&state, now) {
            tracing::debug!("Complaint state for {} expired", phone);
            self.states.remove(phone);
            return None;
        }
        Some(state)
    }
}

fn is_expired(state: &ComplaintState, now: DateTime<Utc>) -> bool {
    now - state.updated_at > Duration::minutes(COMPLAINT_STATE_TTL_MINUTES)
}

/// Persisted complaint
#[derive(Debug, Clone, PartialEq)]
pub struct NewComplaint {
    pub conversation_id: Option<i64>,
    pub draft: ComplaintDraft,
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    async fn record(&self, complaint: &NewComplaint) -> Result<i64, StoreError>;
}

pub struct PgComplaintStore {
    pool: PgPool,
}

impl PgComplaintStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComplaintStore for PgComplaintStore {
    async fn record(&self, complaint: &NewComplaint) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO complaints (conversation_id, phone, category, description, order_number)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(complaint.conversation_id)
        .bind(&complaint.draft.phone)
        .bind(complaint.draft.category.as_str())
        .bind(&complaint.draft.description)
        .bind(&complaint.draft.order_number)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}
