use std::io::{self, BufRead, Write};

use anyhow::Result;
use enquete_core::catalog::{OTHER_OPTION, Question, QuestionKind};
use enquete_core::models::{AnswerValue, AuthMode, Credentials};
use enquete_core::{Enquete, FinishOutcome, FlowStage, SurveyFlow};

use super::print_json;

/// Interactive survey loop: one question per screen, `b` to go back, `q` to
/// quit with progress saved. EOF on stdin behaves like `q`.
pub(crate) fn run_survey(app: &Enquete) -> Result<()> {
    let mut flow = app.survey()?;
    let total = flow.catalog().len();
    if flow.was_restored() {
        println!(
            "Questionnaire repris à la question {}/{}.",
            flow.current_step() + 1,
            total
        );
    }

    loop {
        flow.pump();
        match flow.stage() {
            FlowStage::Collecting => {}
            FlowStage::AwaitingAuth | FlowStage::Finalizing => {
                return complete_with_account(&mut flow);
            }
            FlowStage::Completed => return Ok(()),
        }

        let question = flow.current_question();
        print_question(&flow, question, total)?;
        let Some(line) = read_line()? else {
            return save_and_leave(&mut flow);
        };
        let input = line.trim();
        match input {
            "" => continue,
            "q" | "Q" => return save_and_leave(&mut flow),
            "b" | "B" => {
                if flow.current_step() > 0 {
                    flow.retreat()?;
                } else {
                    println!("Déjà à la première question.");
                }
                continue;
            }
            _ => {}
        }

        if let Err(err) = record_input(&mut flow, question, input) {
            println!("{err}");
            continue;
        }

        if flow.current_step() + 1 < total {
            flow.advance()?;
        } else {
            match flow.finish()? {
                FinishOutcome::Completed(receipt) => {
                    println!("Merci, vos réponses sont enregistrées.");
                    return print_json(&receipt);
                }
                FinishOutcome::AwaitingAuth => {
                    println!("Créez un compte ou connectez-vous pour enregistrer vos résultats.");
                }
            }
        }
    }
}

fn save_and_leave(flow: &mut SurveyFlow) -> Result<()> {
    flow.settle();
    println!("Progression sauvegardée.");
    Ok(())
}

fn print_question(flow: &SurveyFlow, question: &Question, total: usize) -> Result<()> {
    println!();
    println!(
        "[{}/{}] {}",
        flow.current_step() + 1,
        total,
        question.prompt
    );
    if let Some(description) = question.description {
        println!("{description}");
    }
    for (index, option) in question.options.iter().enumerate() {
        println!("  {}. {option}", index + 1);
    }
    match question.kind {
        QuestionKind::Single => println!("(un numéro, b: retour, q: quitter)"),
        QuestionKind::Multiple => {
            println!("(numéros séparés par des virgules, b: retour, q: quitter)");
        }
        QuestionKind::Text => {
            if let Some(placeholder) = question.placeholder {
                println!("({placeholder})");
            }
        }
    }
    if let Some(answer) = flow.answer(question.id) {
        println!("Réponse actuelle : {}", format_answer(answer));
    }
    prompt("> ")
}

fn record_input(flow: &mut SurveyFlow, question: &Question, input: &str) -> Result<()> {
    match question.kind {
        QuestionKind::Text => flow.record_text_answer(question.id, input)?,
        QuestionKind::Single => {
            let choice = pick_option(question, input)?;
            flow.record_answer(question.id, choice)?;
            if choice == OTHER_OPTION {
                prompt_qualifier(flow, question)?;
            }
        }
        QuestionKind::Multiple => {
            let mut choices: Vec<String> = Vec::new();
            for token in input.split(',') {
                let choice = pick_option(question, token.trim())?.to_string();
                if !choices.contains(&choice) {
                    choices.push(choice);
                }
            }
            let has_other = choices.iter().any(|choice| choice == OTHER_OPTION);
            flow.record_answer(question.id, choices)?;
            if has_other {
                prompt_qualifier(flow, question)?;
            }
        }
    }
    Ok(())
}

fn pick_option(question: &Question, token: &str) -> Result<&'static str> {
    let count = question.options.len();
    token
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| question.options.get(index).copied())
        .ok_or_else(|| anyhow::anyhow!("réponse attendue : un numéro entre 1 et {count}"))
}

fn prompt_qualifier(flow: &mut SurveyFlow, question: &Question) -> Result<()> {
    prompt("Précisez votre réponse : ")?;
    if let Some(line) = read_line()? {
        let text = line.trim();
        if !text.is_empty() {
            flow.record_other_qualifier(question.id, text)?;
        }
    }
    Ok(())
}

fn complete_with_account(flow: &mut SurveyFlow) -> Result<()> {
    loop {
        prompt("Avez-vous déjà un compte ? (o/n, q pour quitter) ")?;
        let Some(line) = read_line()? else {
            return abandoned();
        };
        let mode = match line.trim() {
            "o" | "O" => AuthMode::SignIn,
            "n" | "N" => AuthMode::SignUp,
            "q" | "Q" => return abandoned(),
            _ => continue,
        };

        prompt("Email : ")?;
        let Some(email) = read_line()? else {
            return abandoned();
        };
        prompt("Mot de passe : ")?;
        let Some(password) = read_line()? else {
            return abandoned();
        };
        let full_name = if mode == AuthMode::SignUp {
            prompt("Nom complet (optionnel) : ")?;
            read_line()?
                .map(|line| line.trim().to_string())
                .filter(|name| !name.is_empty())
        } else {
            None
        };

        let credentials = Credentials {
            mode,
            email: email.trim().to_string(),
            password: password.trim().to_string(),
            full_name,
        };
        match flow.authenticate(&credentials) {
            Ok(receipt) => {
                println!("Merci, vos réponses sont enregistrées.");
                return print_json(&receipt);
            }
            Err(err) => println!("Échec : {err}. Réessayez."),
        }
    }
}

fn abandoned() -> Result<()> {
    println!("Session conservée ; relancez `enquete run` ou `enquete finalize` après connexion.");
    Ok(())
}

fn format_answer(answer: &AnswerValue) -> String {
    match answer {
        AnswerValue::Scalar(value) => value.clone(),
        AnswerValue::List(values) => values.join(", "),
    }
}

fn prompt(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

fn read_line() -> Result<Option<String>> {
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 { Ok(None) } else { Ok(Some(line)) }
}
