//! Interface de terminal do coordenador: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner e `console` para as cores. O
//! [`PreparationProgress`] acompanha a preparação de um job no terminal.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use job_coordinator::handler::HandleOutcome;
use job_coordinator::message::Envelope;
use job_coordinator::preparation::{JobPreparation, PreparationState};

/// Indicador visual da preparação de um job.
///
/// O spinner mostra o estado de cada componente; retentativas aparecem em
/// amarelo e o resultado final em verde (sucesso) ou vermelho (falha).
pub struct PreparationProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl PreparationProgress {
    /// Inicia o spinner para o job informado.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(format!("job {job_id}: pending"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Atualiza o spinner com o estado atual de cada componente.
    pub fn update(&self, job_id: &str, status: &JobPreparation) {
        self.pb.set_message(format!("job {job_id}: {}", summary(status)));
    }

    /// Registra o resultado de uma entrega que merece destaque.
    pub fn outcome(&self, envelope: &Envelope, outcome: &HandleOutcome) {
        let key = envelope.message.key();
        match outcome {
            HandleOutcome::Retrying { attempt, delay } => self.pb.println(format!(
                "  {} {key}: retry {attempt} in {}ms",
                self.yellow.apply_to("↻"),
                delay.as_millis()
            )),
            HandleOutcome::Failed => {
                self.pb
                    .println(format!("  {} {key}: gave up", self.red.apply_to("✗")));
            }
            _ => {}
        }
    }

    /// Finaliza o spinner e mostra o estado final do job.
    pub fn complete(&self, status: &JobPreparation) {
        self.pb.finish_and_clear();
        match status.state {
            PreparationState::Succeeded => {
                println!("  {} Job prepared", self.green.apply_to("✓"));
            }
            PreparationState::Failed => {
                println!("  {} Job preparation failed", self.red.apply_to("✗"));
                for (component, failure) in &status.failures {
                    println!("      {component}: {failure}");
                }
            }
            state => {
                println!("  {} Job stopped while {state}", self.yellow.apply_to("…"));
            }
        }
    }

    /// Imprime o payload de status em JSON.
    pub fn print_status(&self, status: &JobPreparation) {
        let style = match status.state {
            PreparationState::Succeeded => &self.green,
            PreparationState::Failed => &self.red,
            _ => &self.yellow,
        };
        println!();
        println!("{}", style.apply_to("─── Job Preparation ───"));
        println!("{}", serde_json::to_string_pretty(status).unwrap_or_default());
    }
}

fn summary(status: &JobPreparation) -> String {
    let components: Vec<String> = status
        .request_states
        .iter()
        .map(|(component, state)| format!("{component}={state}"))
        .collect();
    format!("{} [{}]", status.state, components.join(" "))
}
