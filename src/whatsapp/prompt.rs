use crate::whatsapp::text::{contains_phrase, words};

const MENU_KEYWORDS: &[&str] = &[
    "cardapio",
    "menu",
    "o que voces tem",
    "o que tem",
    "opcoes",
    "quais lanches",
    "quais sabores",
];

const IMAGE_KEYWORDS: &[&str] = &["foto", "fotos", "imagem", "imagens", "mostra", "mostrar", "ver como e"];

/// Per-turn facts that shape the system prompt
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub menu_text: String,
    pub customer_name: Option<String>,
    pub first_interaction: bool,
    pub menu_requested: bool,
    pub image_requested: bool,
    pub menu_url: Option<String>,
}

pub fn wants_menu(text: &str) -> bool {
    let w = words(text);
    MENU_KEYWORDS.iter().any(|k| contains_phrase(&w, k))
}

pub fn wants_image(text: &str) -> bool {
    let w = words(text);
    IMAGE_KEYWORDS.iter().any(|k| contains_phrase(&w, k))
}

pub fn build_system_prompt(ctx: &PromptContext) -> String {
    let mut prompt = String::from(
        "Você é o atendente virtual de uma hamburgueria delivery no WhatsApp. \
         Responda em português do Brasil, de forma simpática, curta e objetiva, com no máximo 3 parágrafos. \
         Use apenas os itens e preços do cardápio abaixo; nunca invente produtos, preços ou promoções. \
         Você não fecha pedidos pelo chat: indique o cardápio online para pedir. \
         Para acompanhar um pedido, peça o número dele (ex: #123456).\n\n",
    );

    prompt.push_str("# Cardápio atual\n");
    prompt.push_str(&ctx.menu_text);
    prompt.push_str("\n\n# Instruções desta conversa\n");

    if ctx.first_interaction {
        match &ctx.customer_name {
            Some(name) => prompt.push_str(&format!(
                "- Primeiro contato deste cliente: cumprimente {} pelo nome e dê as boas-vindas.\n",
                name
            )),
            None => prompt.push_str("- Primeiro contato deste cliente: cumprimente e dê as boas-vindas.\n"),
        }
    }
    if ctx.menu_requested {
        prompt.push_str("- O cliente pediu o cardápio: resuma as categorias e destaque alguns itens com preço.\n");
        if let Some(url) = &ctx.menu_url {
            prompt.push_str(&format!("- O cardápio completo para pedir está em {}\n", url));
        }
    }
    if ctx.image_requested {
        prompt.push_str(
            "- O cliente pediu uma foto: cite o nome exato do produto do cardápio; a imagem será enviada em seguida.\n",
        );
    }

    prompt
}
