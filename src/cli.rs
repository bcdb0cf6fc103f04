//! Interface de linha de comando do coordenador baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (demo, config)
//! e flags globais (--max-retries, --verbose).

use clap::{Parser, Subcommand, ValueEnum};
use job_coordinator::job::Component;

/// Coordenador de preparação de jobs de teste.
#[derive(Debug, Parser)]
#[command(name = "job-coordinator", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Número máximo de retentativas por mensagem.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Componente cuja criação deve falhar na demonstração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComponentArg {
    ResultsJob,
    SerializedSuite,
    Machine,
    WorkerJob,
}

impl From<ComponentArg> for Component {
    fn from(arg: ComponentArg) -> Self {
        match arg {
            ComponentArg::ResultsJob => Component::ResultsJob,
            ComponentArg::SerializedSuite => Component::SerializedSuite,
            ComponentArg::Machine => Component::Machine,
            ComponentArg::WorkerJob => Component::WorkerJob,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prepara um job de ponta a ponta contra serviços simulados.
    Demo {
        /// Faz a criação deste componente falhar permanentemente.
        #[arg(long, value_enum)]
        fail: Option<ComponentArg>,

        /// Intervalo de polling, em milissegundos, para todos os componentes.
        #[arg(long, default_value_t = 100)]
        poll_delay_ms: u64,

        /// Suite a preparar.
        #[arg(long, default_value = "suite-demo")]
        suite: String,
    },

    /// Mostra a configuração efetiva em TOML.
    Config,
}
