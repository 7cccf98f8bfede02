//! Pure parsers over the serialized markup of the result-page tables.
//! They never touch the browser, so the per-case flow can hand them the
//! `outerHTML` snapshots and the tests can feed fixed fragments.

use scraper::{ElementRef, Html, Selector};

/// Participation labels counted as the claimant side of the case.
const CLAIMANT_KEYWORDS: [&str; 4] = ["REQTE", "REQUERENTE", "EXEQUENTE", "PARTE ATIVA"];

/// Participation labels counted as the debtor side.
const DEBTOR_KEYWORDS: [&str; 6] = [
    "DEVEDOR",
    "DEVEDORA",
    "ENT. DEVEDORA",
    "REQUERIDO",
    "EXECUTADO",
    "PARTE PASSIVA",
];

/// Parties extracted from the main parties table, in source row order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedParties {
    pub requerentes: Vec<String>,
    pub advogados_requerentes: Vec<String>,
    pub devedores: Vec<String>,
    pub advogados_devedores: Vec<String>,
    /// Participation types outside the two fixed sides, kept as
    /// (label, party name, attorney text) triples for the dynamic columns.
    pub outros: Vec<(String, String, String)>,
}

/// Walks every `<tr>` of the parties table, classifying each row by the
/// `tipoDeParticipacao` span (case-insensitive substring match against the
/// keyword sets) and splitting the compound name cell on the first
/// "Advogado:" / "Advogada:" marker.
pub fn parse_parties(html: &str) -> ParsedParties {
    let mut parties = ParsedParties::default();
    if html.is_empty() {
        return parties;
    }

    let document = Html::parse_fragment(html);
    let row_selector = Selector::parse("tr").unwrap();
    let tipo_selector = Selector::parse("span.tipoDeParticipacao").unwrap();
    let nome_selector = Selector::parse("td.nomeParteEAdvogado").unwrap();

    for row in document.select(&row_selector) {
        let tipo = row
            .select(&tipo_selector)
            .next()
            .map(|span| element_text(&span))
            .unwrap_or_default();
        let tipo_upper = tipo.to_uppercase();

        let Some(td_nome) = row.select(&nome_selector).next() else {
            continue;
        };
        let texto_completo = element_text(&td_nome);
        let (nome_parte, advogado) = split_attorney(&texto_completo);

        if CLAIMANT_KEYWORDS.iter().any(|k| tipo_upper.contains(k)) {
            parties.requerentes.push(nome_parte);
            if !advogado.is_empty() {
                parties.advogados_requerentes.push(advogado);
            }
        } else if DEBTOR_KEYWORDS.iter().any(|k| tipo_upper.contains(k)) {
            parties.devedores.push(nome_parte);
            if !advogado.is_empty() {
                parties.advogados_devedores.push(advogado);
            }
        } else if !tipo.trim().is_empty() {
            parties
                .outros
                .push((tipo.trim().to_string(), nome_parte, advogado));
        }
    }

    parties
}

/// One line per table row, stripped and space-joined, empty rows filtered.
pub fn parse_movements(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let document = Html::parse_fragment(html);
    let row_selector = Selector::parse("tr").unwrap();

    document
        .select(&row_selector)
        .map(|row| element_text(&row))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Looks for the "Outros números" label span anywhere in the page and
/// returns the text of the first inner `<div>` of its enclosing `<div>`.
pub fn parse_other_numbers(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let span_selector = Selector::parse("span").unwrap();
    let div_selector = Selector::parse("div").unwrap();

    for span in document.select(&span_selector) {
        let label = element_text(&span).to_lowercase();
        if !label.contains("outros números") {
            continue;
        }

        let Some(container) = enclosing_div(&span) else {
            return String::new();
        };
        return container
            .select(&div_selector)
            .next()
            .map(|div| element_text(&div))
            .unwrap_or_default();
    }

    String::new()
}

fn enclosing_div<'a>(span: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    span.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "div")
}

/// Text content with internal whitespace collapsed to single spaces,
/// matching how the result tables render multi-node cells.
fn element_text(el: &ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_attorney(texto: &str) -> (String, String) {
    for marker in ["Advogado:", "Advogada:"] {
        if let Some(idx) = texto.find(marker) {
            let nome = texto[..idx].trim().to_string();
            let advogado = format!("{} {}", marker, texto[idx + marker.len()..].trim());
            return (nome, advogado);
        }
    }
    (texto.trim().to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_attorney_on_first_marker() {
        let (nome, advogado) = split_attorney("João Silva Advogado: Dr. Carlos Souza");
        assert_eq!(nome, "João Silva");
        assert_eq!(advogado, "Advogado: Dr. Carlos Souza");
    }

    #[test]
    fn splits_feminine_marker() {
        let (nome, advogado) = split_attorney("Maria Prado Advogada: Dra. Ana Lima");
        assert_eq!(nome, "Maria Prado");
        assert_eq!(advogado, "Advogada: Dra. Ana Lima");
    }

    #[test]
    fn keeps_name_without_attorney() {
        let (nome, advogado) = split_attorney("  Banco Alfa S/A  ");
        assert_eq!(nome, "Banco Alfa S/A");
        assert_eq!(advogado, "");
    }
}
