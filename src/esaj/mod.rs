//! e-SAJ TJSP portal driving: one WebDriver session per run, sequential
//! per-case consultation, and the digital-folder PDF download workflow.
//! Per-field extraction failures degrade to empty strings; per-case
//! failures surface as errors for the caller to turn into sentinel rows.

pub mod case_number;
pub mod parser;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use thirtyfour::prelude::*;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::report::CaseRecord;
use case_number::split_case_number;

const BASE_URL: &str = "https://esaj.tjsp.jus.br";
const CONSULTA_PATH: &str = "/cpopg/abrirConsultaDeRequisitorios.do";

const FIELD_TIMEOUT: Duration = Duration::from_secs(8);
const HTML_TIMEOUT: Duration = Duration::from_secs(10);
const CLICK_TIMEOUT: Duration = Duration::from_secs(15);
const RESULT_TIMEOUT: Duration = Duration::from_secs(25);
const OVERLAY_TIMEOUT: Duration = Duration::from_secs(40);
const CLICK_ATTEMPTS: u32 = 3;

pub struct EsajConfig {
    pub webdriver_url: String,
    pub download_dir: PathBuf,
    pub headless: bool,
    pub download_timeout_secs: u64,
}

/// The CAS login URL, carrying the consultation page as the service to
/// land on after the operator authenticates.
pub fn login_url() -> String {
    let service = format!("{BASE_URL}{CONSULTA_PATH}");
    format!("{BASE_URL}/sajcas/login?service={}", urlencoding::encode(&service))
}

pub struct EsajScraper {
    driver: WebDriver,
    download_dir: PathBuf,
    download_timeout: Duration,
}

impl EsajScraper {
    /// Starts the browser session with the download folder wired into the
    /// Chrome preferences so portal PDFs land where the watcher looks.
    pub async fn new(config: &EsajConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.download_dir).with_context(|| {
            format!(
                "Não foi possível criar a pasta de download {}",
                config.download_dir.display()
            )
        })?;

        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.add_chrome_arg("--headless")?;
        }
        caps.add_chrome_arg("--start-maximized")?;
        caps.add_chrome_arg("--disable-notifications")?;
        caps.add_chrome_arg("--disable-infobars")?;
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_option(
            "prefs",
            serde_json::json!({
                "download.default_directory": config.download_dir.to_string_lossy(),
                "download.prompt_for_download": false,
                "download.directory_upgrade": true,
                "safebrowsing.enabled": true,
                "plugins.always_open_pdf_externally": true,
            }),
        )?;

        let driver = WebDriver::new(&config.webdriver_url, caps)
            .await
            .context("Failed to connect to WebDriver")?;

        Ok(Self {
            driver,
            download_dir: config.download_dir.clone(),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
        })
    }

    /// Opens the CAS login page; authentication itself is manual.
    pub async fn open_login(&self) -> Result<()> {
        self.driver.goto(&login_url()).await?;
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }

    /// Full per-case flow: fill the two search fields, wait for the result
    /// (or the portal error banner), scrape every field and table, then
    /// attempt the PDF download. Field failures are empty strings; only
    /// navigation-level faults bubble up.
    pub async fn consult_case(&self, processo: &str) -> Result<CaseRecord> {
        let (prefixo, sufixo) = split_case_number(processo)?;

        self.driver
            .goto(&format!("{BASE_URL}{CONSULTA_PATH}"))
            .await?;
        self.fill_field("numeroDigitoAnoUnificado", &prefixo).await?;
        self.fill_field("foroNumeroUnificado", &sufixo).await?;

        self.click_with_retry(By::Id("botaoConsultarProcessos"), CLICK_TIMEOUT, CLICK_ATTEMPTS)
            .await?;
        self.wait_for_result(RESULT_TIMEOUT).await?;

        let mut record = CaseRecord::ok(processo);
        record.classe = self.text_by_id("classeProcesso").await;
        record.assunto = self.text_by_id("assuntoProcesso").await;
        record.foro = self.text_by_id("foroProcesso").await;
        record.vara = self.text_by_id("varaProcesso").await;
        record.juiz = self.text_by_id("juizProcesso").await;
        record.distribuicao = self.text_by_id("dataHoraDistribuicaoProcesso").await;
        record.controle = self.text_by_id("numeroControleProcesso").await;
        record.area = self.text_by_id("areaProcesso").await;
        record.valor_acao = self.text_by_id("valorAcaoProcesso").await;

        record.peticoes = self.text_by_id("processoSemDiversas").await;
        record.incidentes = self.text_by_id("processoSemIncidentes").await;
        record.apensos = self.text_by_id("dadosApensosNaoDisponiveis").await;
        record.audiencias = self.text_by_id("processoSemAudiencias").await;

        let page_html = self.driver.source().await.unwrap_or_default();
        record.outros_numeros = parser::parse_other_numbers(&page_html);

        let partes_html = self
            .outer_html(By::Id("tablePartesPrincipais"), HTML_TIMEOUT)
            .await;
        let partes = parser::parse_parties(&partes_html);
        record.requerentes = partes.requerentes;
        record.advogados_requerentes = partes.advogados_requerentes;
        record.devedores = partes.devedores;
        record.advogados_devedores = partes.advogados_devedores;
        record.outras_partes = partes.outros;

        let movimentacoes_html = self
            .outer_html(By::Id("tabelaUltimasMovimentacoes"), HTML_TIMEOUT)
            .await;
        record.movimentacoes = parser::parse_movements(&movimentacoes_html);

        record.caminho_pdf = self.download_case_pdf().await;

        Ok(record)
    }

    /// Opens the digital folder in its own tab and drives the download
    /// dialog. Stray tabs are always closed before returning; any failure
    /// in the workflow degrades to `None` ("Não baixado").
    async fn download_case_pdf(&self) -> Option<PathBuf> {
        let result = self.try_download_pdf().await;
        if let Err(err) = self.close_extra_tabs().await {
            warn!("Falha ao fechar abas extras: {:#}", err);
        }
        match result {
            Ok(Some(name)) => Some(self.download_dir.join(name)),
            Ok(None) => None,
            Err(err) => {
                warn!("Download do PDF falhou: {:#}", err);
                None
            }
        }
    }

    async fn try_download_pdf(&self) -> Result<Option<String>> {
        self.click_with_retry(By::Id("linkPasta"), CLICK_TIMEOUT, CLICK_ATTEMPTS)
            .await?;
        sleep(Duration::from_millis(1500)).await;
        self.switch_to_last_window().await?;

        self.click_with_retry(By::Id("selecionarButton"), RESULT_TIMEOUT, CLICK_ATTEMPTS)
            .await?;
        self.click_with_retry(By::Id("salvarButton"), RESULT_TIMEOUT, CLICK_ATTEMPTS)
            .await?;
        self.click_with_retry(By::Id("opcao1"), CLICK_TIMEOUT, CLICK_ATTEMPTS)
            .await?;

        let continuar = self
            .wait_present(By::Id("botaoContinuar"), Duration::from_secs(20))
            .await?;
        continuar.scroll_into_view().await.ok();
        sleep(Duration::from_millis(500)).await;
        continuar.click().await?;

        self.wait_gone(By::Id("msgAguarde"), OVERLAY_TIMEOUT).await;
        self.click_with_retry(By::Id("btnDownloadDocumento"), RESULT_TIMEOUT, CLICK_ATTEMPTS)
            .await?;

        Ok(wait_for_download(&self.download_dir, self.download_timeout).await)
    }

    /// Visible text of the element with `id`, falling back to the
    /// innerText attribute, empty when the element never shows up.
    async fn text_by_id(&self, id: &str) -> String {
        let Ok(elem) = self.wait_present(By::Id(id), FIELD_TIMEOUT).await else {
            debug!("Campo {} indisponível", id);
            return String::new();
        };

        if let Ok(text) = elem.text().await {
            let text = text.trim().to_string();
            if !text.is_empty() {
                return text;
            }
        }
        match elem.attr("innerText").await {
            Ok(Some(text)) => text.trim().to_string(),
            _ => String::new(),
        }
    }

    async fn outer_html(&self, by: By, timeout: Duration) -> String {
        match self.wait_present(by, timeout).await {
            Ok(elem) => elem.outer_html().await.unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    async fn fill_field(&self, id: &str, value: &str) -> Result<()> {
        let elem = self.wait_present(By::Id(id), CLICK_TIMEOUT).await?;
        elem.click().await?;
        elem.clear().await?;
        elem.send_keys(value).await?;
        Ok(())
    }

    /// Bounded presence wait, polling every 500ms like the other waits.
    async fn wait_present(&self, by: By, timeout: Duration) -> Result<WebElement> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.driver.find(by.clone()).await {
                Ok(elem) => return Ok(elem),
                Err(_) if Instant::now() < deadline => {
                    sleep(Duration::from_millis(500)).await;
                }
                Err(err) => {
                    return Err(err).context(format!("Elemento não encontrado: {:?}", by));
                }
            }
        }
    }

    /// Waits until the element disappears or stops being displayed; used
    /// for the "aguarde" overlay. Expiry is not an error.
    async fn wait_gone(&self, by: By, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.driver.find(by.clone()).await {
                Ok(elem) => {
                    if !elem.is_displayed().await.unwrap_or(false) {
                        return;
                    }
                }
                Err(_) => return,
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Waits until either the case header or the portal error banner is on
    /// the page after submitting the search form.
    async fn wait_for_result(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let has_header = self.driver.find(By::Id("classeProcesso")).await.is_ok();
            let has_error = self.driver.find(By::Css(".mensagemErro")).await.is_ok();
            if has_header || has_error {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("Resultado da consulta não carregou");
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// Clicks the element, retrying with linear backoff when the click is
    /// intercepted or the element goes stale. The only retry in the tool.
    async fn click_with_retry(&self, by: By, timeout: Duration, attempts: u32) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.try_click(by.clone(), timeout).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(
                        "Clique em {:?} falhou (tentativa {}/{}): {:#}",
                        by, attempt, attempts, err
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        sleep(Duration::from_secs(attempt as u64)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Clique falhou: {:?}", by)))
    }

    async fn try_click(&self, by: By, timeout: Duration) -> Result<()> {
        let elem = self.wait_present(by, timeout).await?;
        elem.scroll_into_view().await.ok();
        elem.click().await?;
        Ok(())
    }

    async fn switch_to_last_window(&self) -> Result<()> {
        let handles = self.driver.windows().await?;
        if let Some(last) = handles.last() {
            self.driver.switch_to_window(last.clone()).await?;
        }
        Ok(())
    }

    /// Closes every window except the first and focuses the first again.
    pub async fn close_extra_tabs(&self) -> Result<()> {
        loop {
            let handles = self.driver.windows().await?;
            if handles.len() <= 1 {
                break;
            }
            if let Some(last) = handles.last() {
                self.driver.switch_to_window(last.clone()).await?;
                self.driver.close_window().await?;
                sleep(Duration::from_millis(300)).await;
            }
        }
        let handles = self.driver.windows().await?;
        if let Some(first) = handles.first() {
            self.driver.switch_to_window(first.clone()).await?;
        }
        Ok(())
    }
}

/// Watches the download folder for a PDF that was not present when the
/// watch started, skipping partial downloads, until the timeout expires.
pub async fn wait_for_download(dir: &Path, timeout: Duration) -> Option<String> {
    let existing = pdf_names(dir);
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        for name in pdf_names(dir) {
            if !existing.contains(&name) && !name.ends_with(".crdownload") {
                info!("PDF baixado: {}", name);
                return Some(name);
            }
        }
        sleep(Duration::from_secs(1)).await;
    }

    warn!("Tempo limite atingido. Nenhum PDF encontrado.");
    None
}

fn pdf_names(dir: &Path) -> HashSet<String> {
    let mut names = HashSet::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return names;
    };
    for entry in entries.flatten() {
        if let Some(name) = entry.file_name().to_str() {
            if name.to_lowercase().ends_with(".pdf") {
                names.insert(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_url_carries_encoded_service() {
        let url = login_url();
        assert!(url.starts_with("https://esaj.tjsp.jus.br/sajcas/login?service="));
        assert!(url.contains("%2Fcpopg%2FabrirConsultaDeRequisitorios.do"));
    }
}
