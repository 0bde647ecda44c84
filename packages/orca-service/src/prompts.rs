use serde_json::{Value, json};

use orca_domain::{IntentLabel, RankedItem};

const INTENT_SYSTEM: &str = "\
You classify shopping queries. Reply with one JSON object only: \
{\"intent\": \"search\"|\"recommend\"|\"question\"|\"clarify\", \"confidence\": number in [0,1], \
\"needs_clarification\": boolean, \"language\": BCP-47 tag}. \
Use \"clarify\" when the query cannot be acted on without asking the shopper something.";

const REWRITE_SYSTEM: &str = "\
You rewrite shopping queries for a catalog search engine. Fix spelling, drop filler words, and keep \
the shopper's meaning. Reply with one JSON object only: {\"normalized_query\": string, \
\"filters\": object, \"boosts\": array of strings, \"confidence\": number in [0,1]}. \
Filter values must be strings, numbers, or booleans. Never invent constraints the query does not state.";

const CLARIFICATION_SYSTEM: &str = "\
The shopper's query is ambiguous. Ask exactly one short question that would let a search engine \
answer it. Reply with one JSON object only: {\"question\": string, \"confidence\": number in [0,1]}.";

const EXPLANATION_SYSTEM: &str = "\
Explain briefly why each listed product matches the query. Only mention products from the list, \
by their item_id. Reply with one JSON object only: {\"explanations\": [{\"item_id\": string, \
\"reason\": string}], \"confidence\": number in [0,1]}.";

const COMPOSITION_SYSTEM: &str = "\
Write a two-sentence summary of the listed results for the shopper. Cite products by item_id and \
only cite products from the list. Reply with one JSON object only: {\"summary\": string, \
\"cited_ids\": array of strings, \"confidence\": number in [0,1]}.";

pub(crate) fn intent(query: &str) -> Vec<Value> {
	messages(INTENT_SYSTEM, json!({ "query": query }))
}

pub(crate) fn rewrite(
	query: &str,
	intent: Option<IntentLabel>,
	filter_fields: &[String],
) -> Vec<Value> {
	let system = if filter_fields.is_empty() {
		format!("{REWRITE_SYSTEM} Do not emit any filters.")
	} else {
		format!("{REWRITE_SYSTEM} Allowed filter keys: {}.", filter_fields.join(", "))
	};

	messages(
		&system,
		json!({ "query": query, "intent": intent.map(IntentLabel::as_str) }),
	)
}

pub(crate) fn clarification(query: &str) -> Vec<Value> {
	messages(CLARIFICATION_SYSTEM, json!({ "query": query }))
}

pub(crate) fn explanation(query: &str, items: &[RankedItem]) -> Vec<Value> {
	messages(EXPLANATION_SYSTEM, json!({ "query": query, "items": items }))
}

pub(crate) fn composition(query: &str, items: &[RankedItem]) -> Vec<Value> {
	messages(COMPOSITION_SYSTEM, json!({ "query": query, "items": items }))
}

fn messages(system: &str, user: Value) -> Vec<Value> {
	vec![
		json!({ "role": "system", "content": system }),
		json!({ "role": "user", "content": user.to_string() }),
	]
}
