//! Prompt builders for the gateway operations. Inputs are truncated to keep
//! token spend predictable; prompts ask for JSON with no raw newlines in
//! string values, but the lenient parser handles them anyway.

use llm_client::truncate_to_char_boundary;

/// Body text cap for per-article LLM inputs.
pub const ARTICLE_TEXT_CAP: usize = 2000;

pub fn entity_extraction(title: &str, text: &str) -> String {
    let text = truncate_to_char_boundary(text, ARTICLE_TEXT_CAP);
    format!(
        r#"Extract cryptocurrency-related entities from this article.

Title: {title}
Text: {text}

Return a JSON object with this structure:
{{
  "primary_entities": [
    {{"name": "Bitcoin", "type": "cryptocurrency", "ticker": "BTC", "confidence": 0.95}}
  ],
  "context_entities": [
    {{"name": "Gary Gensler", "type": "person", "confidence": 0.8}}
  ],
  "sentiment": "positive"
}}

Primary entity types: cryptocurrency, blockchain, protocol, company, organization.
Context entity types: person, event, regulation, location.
Only include entities mentioned in the text. Normalize crypto names (BTC -> Bitcoin).
Sentiment is one of: positive, neutral, negative."#
    )
}

pub fn narrative_discovery(title: &str, text: &str) -> String {
    let text = truncate_to_char_boundary(text, ARTICLE_TEXT_CAP);
    format!(
        r#"You are a narrative analyst studying emerging patterns in crypto news.

Given the following article, describe:

1. The main actors (people, organizations, protocols, assets, regulators).
   For each actor assign a salience score from 1-5:
   5 = central protagonist (the article is ABOUT this entity)
   4 = key participant (actively involved in the main events)
   3 = secondary participant
   2 = supporting context
   1 = passing mention (exclude these from the list)

2. Nucleus entity (required): the ONE entity this article is primarily about.

3. The main actions or events (what happened).

4. The forces or tensions at play (e.g. regulation vs innovation).

5. The implications (why it matters).

Then summarize in 2-3 sentences what broader narrative this article contributes to.

Article Title: {title}
Article Text: {text}

Output valid JSON with no raw newlines inside string values:
{{
  "actors": ["SEC", "Binance"],
  "actor_salience": {{"SEC": 5, "Binance": 4}},
  "nucleus_entity": "SEC",
  "actions": ["SEC filed lawsuit against Binance"],
  "tensions": ["Regulation vs Innovation"],
  "implications": "why this matters",
  "narrative_summary": "2-3 sentence description"
}}"#
    )
}

pub fn cluster_summary(snippets: &[String]) -> String {
    let joined = snippets.join("\n");
    format!(
        r#"These crypto news articles were grouped into one story by shared nucleus entity and actors.

Articles in this cluster:
{joined}

Generate:
1. A concise, specific title (max 60 characters) that captures the main story.
2. A 2-3 sentence summary of what is happening in this narrative.

Return valid JSON with no raw newlines in string values: {{"title": "...", "summary": "..."}}"#
    )
}

pub fn sentiment(text: &str) -> String {
    let text = truncate_to_char_boundary(text, ARTICLE_TEXT_CAP);
    format!(
        "Analyze the sentiment of this crypto text. Return ONLY a single number \
         from -1.0 (very bearish) to 1.0 (very bullish). No explanation, just the number:\n\n{text}"
    )
}

pub fn relevance(text: &str) -> String {
    let text = truncate_to_char_boundary(text, ARTICLE_TEXT_CAP);
    format!(
        "Rate how relevant this text is to cryptocurrency markets. Return ONLY a single \
         number from 0.0 (irrelevant) to 1.0 (highly relevant). No explanation:\n\n{text}"
    )
}

pub fn themes(text: &str) -> String {
    let text = truncate_to_char_boundary(text, ARTICLE_TEXT_CAP);
    format!(
        "Extract the key crypto themes from the following text. Respond with ONLY a \
         comma-separated list of short keywords (e.g. 'Bitcoin, DeFi, Regulation'). \
         No preamble.\n\nText:\n{text}"
    )
}
