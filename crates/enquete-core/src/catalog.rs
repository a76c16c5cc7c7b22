use serde::Serialize;

use crate::models::AnswerValue;

/// Sentinel option a user can pick to answer outside the declared set.
pub const OTHER_OPTION: &str = "Autre";
/// Prefix tagging a stored value as a qualified sentinel answer.
pub const OTHER_PREFIX: &str = "Autre: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Single,
    Multiple,
    Text,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multiple => "multiple",
            Self::Text => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub section: &'static str,
    pub prompt: &'static str,
    pub kind: QuestionKind,
    pub options: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
}

static QUESTIONS: [Question; 7] = [
    Question {
        id: "q1",
        section: "Votre bien",
        prompt: "De quel type de bien s'agit-il ?",
        kind: QuestionKind::Single,
        options: &["Une maison", "Un appartement", "Un immeuble", "Autre"],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q2",
        section: "Votre bien",
        prompt: "Dans quel contexte s'inscrit votre réflexion ?",
        kind: QuestionKind::Single,
        options: &[
            "Un projet de vente",
            "Un projet d'acquisition",
            "Une succession",
            "Les obligations de performance pour la location",
            "Autre",
        ],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q3",
        section: "Votre bien",
        prompt: "Quelle est/sera votre statut vis à vis de ce logement, au sens de la fiscalité ?",
        kind: QuestionKind::Single,
        options: &[
            "Propriétaire occupant (domiciliation fiscale)",
            "Occupant en résidence principale par le biais d'une SCI",
            "Propriétaire en résidence secondaire",
            "Propriétaire bailleur en nom propre (location pour une résidence principale)",
            "Propriétaire bailleur par le biais d'une personne morale (de type SCI...)",
            "Autre",
        ],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q4",
        section: "Votre bien",
        prompt: "Pour environ combien d'années vous projetez-vous dans votre logement ?",
        kind: QuestionKind::Single,
        options: &[
            "Moins de 2 ans",
            "Entre 2 et 5 ans",
            "Entre 5 et 10 ans",
            "Plus de 10 ans",
            "Je ne sais pas",
        ],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q5",
        section: "Votre bien",
        prompt: "Quelles sont vos motivations pour la réalisation de travaux de rénovation énergétique ?",
        kind: QuestionKind::Multiple,
        options: &[
            "Je veux améliorer l'étiquette DPE (Diagnostic de Performance Energétique) de mon logement",
            "Je souhaite réduire mes factures d'énergie",
            "Je souhaite améliorer mon confort d'été",
            "Je souhaite améliorer mon confort d'hiver",
            "Autre",
        ],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q6",
        section: "Votre bien",
        prompt: "Avez-vous remarqué des problèmes d'humidité ou de structure dans le logement ?",
        kind: QuestionKind::Multiple,
        options: &[
            "Problèmes d'humidité",
            "Problèmes de structure",
            "Aucun problème",
            "Autre",
        ],
        description: None,
        placeholder: None,
    },
    Question {
        id: "q7",
        section: "Votre bien",
        prompt: "Avez-vous une question ou un objectif précis dont vous souhaitez nous faire part ?",
        kind: QuestionKind::Text,
        options: &[],
        description: None,
        placeholder: Some("Décrivez votre question ou objectif ici..."),
    },
];

pub fn questions() -> &'static [Question] {
    &QUESTIONS
}

pub fn total_questions() -> usize {
    QUESTIONS.len()
}

pub fn find_question(id: &str) -> Option<&'static Question> {
    QUESTIONS.iter().find(|question| question.id == id)
}

pub fn sections() -> Vec<&'static str> {
    let mut seen = Vec::new();
    for question in &QUESTIONS {
        if !seen.contains(&question.section) {
            seen.push(question.section);
        }
    }
    seen
}

/// Estimated completion time for the whole catalog, in minutes.
pub fn estimated_minutes() -> u32 {
    7
}

pub fn qualify_other(text: &str) -> String {
    format!("{OTHER_PREFIX}{text}")
}

pub fn split_other(value: &str) -> Option<&str> {
    value.strip_prefix(OTHER_PREFIX)
}

/// Splits a stored answer into the selection to restore and the qualifier
/// text that refined the sentinel, if any. Scalar values tagged with the
/// sentinel prefix collapse back to the sentinel; tagged items inside a
/// list do the same in place.
pub fn decode_answer(answer: &AnswerValue) -> (AnswerValue, Option<String>) {
    match answer {
        AnswerValue::Scalar(value) => match split_other(value) {
            Some(text) => (
                AnswerValue::Scalar(OTHER_OPTION.to_string()),
                Some(text.to_string()),
            ),
            None => (answer.clone(), None),
        },
        AnswerValue::List(values) => {
            let mut qualifier = None;
            let restored = values
                .iter()
                .map(|item| match split_other(item) {
                    Some(text) => {
                        qualifier = Some(text.to_string());
                        OTHER_OPTION.to_string()
                    }
                    None => item.clone(),
                })
                .collect();
            (AnswerValue::List(restored), qualifier)
        }
    }
}

/// Re-derives the final stored value for an answer whose sentinel option is
/// qualified by free text: the sentinel is substituted with the tagged form,
/// every other value passes through unchanged.
pub fn apply_qualifier(answer: &AnswerValue, text: &str) -> AnswerValue {
    match answer {
        AnswerValue::Scalar(value) if value == OTHER_OPTION => {
            AnswerValue::Scalar(qualify_other(text))
        }
        AnswerValue::Scalar(_) => answer.clone(),
        AnswerValue::List(values) => AnswerValue::List(
            values
                .iter()
                .map(|item| {
                    if item == OTHER_OPTION {
                        qualify_other(text)
                    } else {
                        item.clone()
                    }
                })
                .collect(),
        ),
    }
}
