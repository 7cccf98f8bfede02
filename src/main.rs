use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{error, info, warn};

use processo_cli::docmine::{self, annex::OcrSettings, MinerConfig};
use processo_cli::esaj::{EsajConfig, EsajScraper};
use processo_cli::faillog::FailureLog;
use processo_cli::report::{self, CaseRecord, ReportWriter};

const FAILURE_LOG: &str = "erros_processos.log";
const OUTPUT_BASE_NAME: &str = "resultados_processos";

#[derive(Parser)]
#[command(name = "processo-cli")]
#[command(about = "Extração de dados de processos do portal e-SAJ TJSP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consulta cada processo da planilha de entrada e grava uma linha de
    /// resultado por processo
    Scrape {
        /// Planilha com a coluna de números de processo
        #[arg(short, long)]
        input: PathBuf,

        /// Planilha de saída (auto-incrementada quando omitida)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Máximo de processos consultados
        #[arg(short, long, default_value_t = 100)]
        limit: usize,

        /// Pasta observada para os PDFs baixados
        #[arg(long, default_value = "downloads")]
        download_dir: PathBuf,

        #[arg(long)]
        webdriver_url: Option<String>,

        #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
        headless: bool,

        /// Tempo máximo (s) de espera por um download
        #[arg(long, default_value_t = 90)]
        download_timeout: u64,
    },

    /// Minera CPF/CNPJ das partes nos PDFs já baixados e preenche a
    /// planilha de resultados
    Mine {
        /// Planilha de resultados a atualizar
        #[arg(short, long)]
        results: PathBuf,

        /// Pasta com os PDFs nomeados pelo número do processo
        #[arg(short, long)]
        pdf_dir: PathBuf,

        #[arg(long, default_value_t = 300)]
        dpi: u32,

        #[arg(long, default_value = "por")]
        lang: String,
    },

    /// Relaciona os processos da planilha com os PDFs de uma pasta e gera
    /// um relatório de caminhos
    LocatePdfs {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        pdf_dir: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn prompt_enter(prompt: &str) -> Result<()> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .context("Failed to flush stdout while prompting for input")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read prompt input")?;
    Ok(())
}

fn resolve_webdriver_url(flag: Option<String>) -> String {
    flag.filter(|url| !url.trim().is_empty())
        .or_else(|| std::env::var("WEBDRIVER_URL").ok())
        .unwrap_or_else(|| "http://localhost:9515".to_string())
}

async fn run_scrape(
    input: PathBuf,
    output: Option<PathBuf>,
    limit: usize,
    download_dir: PathBuf,
    webdriver_url: Option<String>,
    headless: bool,
    download_timeout: u64,
) -> Result<()> {
    let faillog = FailureLog::new(FAILURE_LOG);

    let processos = report::load_case_numbers(&input, Some(limit))?;
    if processos.is_empty() {
        info!("Nenhum número de processo encontrado na planilha.");
        return Ok(());
    }

    let output =
        output.unwrap_or_else(|| report::next_output_path(Path::new("."), OUTPUT_BASE_NAME));
    let mut writer = ReportWriter::open(&output)?;

    let config = EsajConfig {
        webdriver_url: resolve_webdriver_url(webdriver_url),
        download_dir,
        headless,
        download_timeout_secs: download_timeout,
    };
    let scraper = EsajScraper::new(&config).await?;

    scraper.open_login().await?;
    prompt_enter("Faça o login manualmente e pressione ENTER para continuar...")?;

    let run_result = process_all(&scraper, &processos, &mut writer, &faillog).await;

    if let Err(err) = scraper.close().await {
        warn!("Falha ao encerrar o navegador: {:#}", err);
    }
    run_result?;

    info!("Resultados salvos em {}", writer.path().display());
    Ok(())
}

async fn process_all(
    scraper: &EsajScraper,
    processos: &[String],
    writer: &mut ReportWriter,
    faillog: &FailureLog,
) -> Result<()> {
    let total = processos.len();

    for (indice, processo) in processos.iter().enumerate() {
        info!(
            "Processando {}/{} - processo: {}",
            indice + 1,
            total,
            processo
        );

        let record = match scraper.consult_case(processo).await {
            Ok(record) => record,
            Err(err) => {
                let mensagem = format!("{err:#}");
                error!("Erro ao consultar {}: {}", processo, mensagem);
                if let Err(log_err) = faillog.record(processo, &mensagem) {
                    warn!("Falha ao gravar no log de erros: {:#}", log_err);
                }
                CaseRecord::error(processo, &mensagem)
            }
        };

        writer.append_case(&record)?;

        if indice + 1 < total {
            let delay = rand::thread_rng().gen_range(1..=3);
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
    }

    Ok(())
}

async fn run_mine(results: PathBuf, pdf_dir: PathBuf, dpi: u32, lang: String) -> Result<()> {
    let config = MinerConfig {
        results_path: results,
        pdf_dir,
        ocr: OcrSettings { dpi, lang },
    };
    docmine::mine_results(&config).await
}

fn run_locate_pdfs(input: PathBuf, pdf_dir: PathBuf, output: PathBuf) -> Result<()> {
    let processos = report::load_case_column(&input)?;
    info!("Total de processos: {}", processos.len());

    let listing: std::collections::HashSet<String> = std::fs::read_dir(&pdf_dir)
        .with_context(|| format!("Pasta de PDFs não encontrada: {}", pdf_dir.display()))?
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().map(|name| name.to_string()))
        .collect();
    info!("{} arquivo(s) na pasta de PDFs", listing.len());

    let mut rows = Vec::new();
    let mut encontrados = 0usize;
    let mut nao_encontrados = 0usize;

    for processo in &processos {
        if report::is_blank_case(processo) {
            rows.push((
                processo.clone(),
                "Número de processo inválido".to_string(),
                "Inválido".to_string(),
            ));
            continue;
        }

        let nome_pdf = format!("{processo}.pdf");
        if listing.contains(&nome_pdf) {
            let caminho = pdf_dir.join(&nome_pdf);
            info!("✓ {} -> Encontrado", processo);
            rows.push((
                processo.clone(),
                caminho.display().to_string(),
                "Encontrado".to_string(),
            ));
            encontrados += 1;
        } else {
            info!("✗ {} -> Não encontrado", processo);
            rows.push((
                processo.clone(),
                "PDF não encontrado".to_string(),
                "Não encontrado".to_string(),
            ));
            nao_encontrados += 1;
        }
    }

    report::write_pdf_path_report(&output, &rows)?;

    info!("Resultados salvos em {}", output.display());
    info!(
        "PDFs encontrados: {} | não encontrados: {}",
        encontrados, nao_encontrados
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    dotenv::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            input,
            output,
            limit,
            download_dir,
            webdriver_url,
            headless,
            download_timeout,
        } => {
            run_scrape(
                input,
                output,
                limit,
                download_dir,
                webdriver_url,
                headless,
                download_timeout,
            )
            .await
        }

        Commands::Mine {
            results,
            pdf_dir,
            dpi,
            lang,
        } => run_mine(results, pdf_dir, dpi, lang).await,

        Commands::LocatePdfs {
            input,
            pdf_dir,
            output,
        } => run_locate_pdfs(input, pdf_dir, output),
    }
}
