//! Prompt template sets, keyed by [`Language`].
//!
//! The language is a closed enum, so an unsupported language fails at
//! settings load; this module can only ever be asked for a set it has.
//! The sufficiency-verdict phrases are not templates: they are the
//! canonical gate contract and live in [`crate::gate`] regardless of
//! language.

use askdb_core::constants::{NO_ANALYSIS, NO_DATA, NO_METADATA};
use askdb_settings::Language;

/// One language's prompt templates.
pub struct PromptSet {
    /// System template for query-plan generation; placeholders
    /// `{metadata}`, `{data}`.
    query_system: &'static str,
    /// System template for post-processing (analysis) generation;
    /// placeholder `{data}`.
    analysis_system: &'static str,
    /// Corrective instruction injected after a detected failure.
    pub retry_instruction: &'static str,
    /// Terminal message when the data-retrieval budget is exhausted.
    pub give_up_data: &'static str,
    /// Terminal message when the post-processing budget is exhausted.
    pub give_up_analysis: &'static str,
    /// System prompt for the sufficiency gate.
    pub gate_system: &'static str,
    /// User template for the gate; placeholders `{question}`,
    /// `{metadata}`, `{data}`.
    gate_user: &'static str,
    /// System prompt for the final answer.
    pub answer_system: &'static str,
    /// User template for the final answer; placeholders `{question}`,
    /// `{metadata}`, `{data}`, `{analysis}`.
    answer_user: &'static str,
}

impl PromptSet {
    /// Fill the query-generation system prompt with the consolidated
    /// scalars, or their sentinels when unset.
    #[must_use]
    pub fn query_prompt(&self, metadata: Option<&str>, fetched_data: Option<&str>) -> String {
        fill(
            self.query_system,
            &[
                ("metadata", metadata.unwrap_or(NO_METADATA)),
                ("data", fetched_data.unwrap_or(NO_DATA)),
            ],
        )
    }

    /// Fill the analysis-generation system prompt with the fetched
    /// data, or its sentinel when unset.
    #[must_use]
    pub fn analysis_prompt(&self, fetched_data: Option<&str>) -> String {
        fill(
            self.analysis_system,
            &[("data", fetched_data.unwrap_or(NO_DATA))],
        )
    }

    /// Fill the gate user prompt. Unset values render as their
    /// sentinels.
    #[must_use]
    pub fn gate_prompt(
        &self,
        question: &str,
        metadata: Option<&str>,
        fetched_data: Option<&str>,
    ) -> String {
        fill(
            self.gate_user,
            &[
                ("question", question),
                ("metadata", metadata.unwrap_or(NO_METADATA)),
                ("data", fetched_data.unwrap_or(NO_DATA)),
            ],
        )
    }

    /// Fill the final-answer user prompt. Unset values render as their
    /// sentinels.
    #[must_use]
    pub fn answer_prompt(
        &self,
        question: &str,
        metadata: Option<&str>,
        fetched_data: Option<&str>,
        analysis_output: Option<&str>,
    ) -> String {
        fill(
            self.answer_user,
            &[
                ("question", question),
                ("metadata", metadata.unwrap_or(NO_METADATA)),
                ("data", fetched_data.unwrap_or(NO_DATA)),
                ("analysis", analysis_output.unwrap_or(NO_ANALYSIS)),
            ],
        )
    }
}

/// Replace `{name}` placeholders in `template`.
fn fill(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in replacements {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Look up the template set for a language.
#[must_use]
pub fn prompt_set(language: Language) -> &'static PromptSet {
    match language {
        Language::En => &EN,
        Language::It => &IT,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// English
// ─────────────────────────────────────────────────────────────────────────────

static EN: PromptSet = PromptSet {
    query_system: "You are a data analyst answering questions about a data \
warehouse. Use the available capabilities to fetch the schema, look up similar \
answered questions, and run read-only SQL queries until you have the data the \
question needs. Request one capability at a time and ground every query in the \
fetched schema.\n\nSchema metadata:\n{metadata}\n\nFetched data so far:\n{data}",
    analysis_system: "You are a data analyst post-processing query results. If \
the fetched data needs aggregation, reshaping, or derived figures to answer the \
question, produce a Python script that prints the result to stdout. If no \
post-processing is needed, reply with a short note and no capability \
request.\n\nFetched data:\n{data}",
    retry_instruction: "The previous capability request failed with the error \
shown above. Correct the request and try again. Do not repeat the same mistake.",
    give_up_data: "Capability usage failed too many times in a row. Skipping \
further data retrieval.",
    give_up_analysis: "Capability usage failed too many times in a row. Skipping \
further post-processing.",
    gate_system: "You are a strict evaluator. Decide whether the fetched data is \
enough to answer the question. Reply with exactly one of the two verdicts: \
'DATA IS EXHAUSTIVE' if the data suffices, or 'MISSING DATA' if anything needed \
is absent. No other wording.",
    gate_user: "Question: {question}\n\nSchema metadata:\n{metadata}\n\n\
Fetched data:\n{data}\n\nVerdict:",
    answer_system: "You are a data analyst writing the final answer. Answer the \
question using only the material below. Cite concrete figures from the data. If \
something needed is missing, say so plainly.",
    answer_user: "Question: {question}\n\nSchema metadata:\n{metadata}\n\n\
Fetched data:\n{data}\n\nAnalysis output:\n{analysis}",
};

// ─────────────────────────────────────────────────────────────────────────────
// Italian
// ─────────────────────────────────────────────────────────────────────────────

static IT: PromptSet = PromptSet {
    query_system: "Sei un analista dati che risponde a domande su un data \
warehouse. Usa le funzionalità disponibili per recuperare lo schema, cercare \
domande simili già risposte ed eseguire query SQL in sola lettura finché non \
hai i dati necessari. Richiedi una funzionalità alla volta e basa ogni query \
sullo schema recuperato.\n\nMetadati dello schema:\n{metadata}\n\n\
Dati recuperati finora:\n{data}",
    analysis_system: "Sei un analista dati che rielabora i risultati delle \
query. Se i dati recuperati richiedono aggregazioni, trasformazioni o valori \
derivati per rispondere alla domanda, produci uno script Python che stampi il \
risultato su stdout. Se non serve alcuna rielaborazione, rispondi con una breve \
nota e nessuna richiesta di funzionalità.\n\nDati recuperati:\n{data}",
    retry_instruction: "La richiesta precedente è fallita con l'errore mostrato \
sopra. Correggi la richiesta e riprova. Non ripetere lo stesso errore.",
    give_up_data: "L'uso delle funzionalità è fallito troppe volte di seguito. \
Recupero dati interrotto.",
    give_up_analysis: "L'uso delle funzionalità è fallito troppe volte di \
seguito. Rielaborazione interrotta.",
    gate_system: "Sei un valutatore rigoroso. Decidi se i dati recuperati \
bastano per rispondere alla domanda. Rispondi con esattamente uno dei due \
verdetti: 'DATA IS EXHAUSTIVE' se i dati bastano, oppure 'MISSING DATA' se \
manca qualcosa di necessario. Nessun'altra formulazione.",
    gate_user: "Domanda: {question}\n\nMetadati dello schema:\n{metadata}\n\n\
Dati recuperati:\n{data}\n\nVerdetto:",
    answer_system: "Sei un analista dati che scrive la risposta finale. Rispondi \
alla domanda usando solo il materiale qui sotto. Cita valori concreti presi dai \
dati. Se manca qualcosa di necessario, dillo chiaramente.",
    answer_user: "Domanda: {question}\n\nMetadati dello schema:\n{metadata}\n\n\
Dati recuperati:\n{data}\n\nOutput dell'analisi:\n{analysis}",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_has_a_set() {
        for language in [Language::En, Language::It] {
            let set = prompt_set(language);
            assert!(!set.query_prompt(None, None).is_empty());
            assert!(!set.give_up_data.is_empty());
        }
    }

    #[test]
    fn query_prompt_uses_sentinels_when_unset() {
        let set = prompt_set(Language::En);
        let prompt = set.query_prompt(None, None);
        assert!(prompt.contains("No metadata fetched yet"));
        assert!(prompt.contains("No rows fetched yet"));
    }

    #[test]
    fn query_prompt_uses_values_when_set() {
        let set = prompt_set(Language::En);
        let prompt = set.query_prompt(Some("orders: [id]"), Some("count\n42"));
        assert!(prompt.contains("orders: [id]"));
        assert!(prompt.contains("count\n42"));
        assert!(!prompt.contains("No metadata fetched yet"));
    }

    #[test]
    fn analysis_prompt_carries_the_fetched_data() {
        let set = prompt_set(Language::It);
        let prompt = set.analysis_prompt(Some("count\n42"));
        assert!(prompt.contains("count\n42"));
        assert!(!set.analysis_prompt(None).contains("count"));
    }

    #[test]
    fn answer_prompt_uses_sentinels_when_unset() {
        let set = prompt_set(Language::En);
        let prompt = set.answer_prompt("how many orders?", None, None, None);
        assert!(prompt.contains("how many orders?"));
        assert!(prompt.contains("No metadata fetched yet"));
        assert!(prompt.contains("No rows fetched yet"));
        assert!(prompt.contains("No previous analysis output"));
    }

    #[test]
    fn answer_prompt_uses_values_when_set() {
        let set = prompt_set(Language::En);
        let prompt = set.answer_prompt(
            "how many orders?",
            Some("orders: [id]"),
            Some("count\n42"),
            None,
        );
        assert!(prompt.contains("orders: [id]"));
        assert!(prompt.contains("count\n42"));
        assert!(!prompt.contains("No rows fetched yet"));
    }

    #[test]
    fn gate_prompt_fills_question_metadata_and_data() {
        let set = prompt_set(Language::It);
        let prompt = set.gate_prompt("quanti ordini?", Some("orders: [id]"), Some("count\n42"));
        assert!(prompt.contains("quanti ordini?"));
        assert!(prompt.contains("orders: [id]"));
        assert!(prompt.contains("count\n42"));
    }

    #[test]
    fn gate_prompt_uses_sentinels_when_unset() {
        let set = prompt_set(Language::En);
        let prompt = set.gate_prompt("how many orders?", None, None);
        assert!(prompt.contains("No metadata fetched yet"));
        assert!(prompt.contains("No rows fetched yet"));
    }

    #[test]
    fn fill_replaces_all_occurrences() {
        assert_eq!(fill("{a} and {a} and {b}", &[("a", "x"), ("b", "y")]), "x and x and y");
    }

    #[test]
    fn italian_verdict_phrases_stay_canonical() {
        // The gate contract is language-independent.
        assert!(IT.gate_system.contains("DATA IS EXHAUSTIVE"));
        assert!(IT.gate_system.contains("MISSING DATA"));
    }
}
