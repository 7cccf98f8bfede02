//! Name-proximity search: given the annex page text and (optionally) a
//! party name, find the CPF/CNPJ most plausibly tied to that name.
//!
//! The search is an ordered list of independent strategies; the first one
//! that produces a match wins. It is tuned to one document template and
//! offers no association guarantee beyond "first plausible match in an
//! expanding radius" — callers are expected to live with that.

use super::patterns::{self, first_document, DOC_LABEL};

/// Lines scanned before and after the anchor line holding the name.
const WINDOW_BEFORE: usize = 15;
const WINDOW_AFTER: usize = 16;

/// Lines checked after a "nome:" label for its document.
const NOME_LOOKAHEAD: usize = 4;

pub fn document_near_name(text: &str, target_name: Option<&str>) -> Option<String> {
    let lines: Vec<&str> = text.split('\n').collect();

    // Strategy 1: a "Nome:" field followed closely by the document, the
    // layout of the annex form. Works with no target name at all.
    if let Some(found) = nome_field_scan(&lines) {
        return Some(found);
    }

    // Strategy 2: nothing to anchor on, take the first document in the page.
    let normalized = target_name
        .map(patterns::normalize_name)
        .unwrap_or_default();
    if normalized.is_empty() {
        return first_document_in_page(text);
    }

    // Strategy 3: anchor on the first line holding enough of the name's
    // words; without an anchor, degrade to the page-wide first match.
    let Some(anchor) = anchor_line(&lines, &normalized) else {
        return first_document_in_page(text);
    };

    let start = anchor.saturating_sub(WINDOW_BEFORE);
    let end = (anchor + WINDOW_AFTER).min(lines.len());

    // Strategy 4a: a labeled CPF/CNPJ field inside the window.
    if let Some(found) = labeled_field_in_window(&lines, start, end) {
        return Some(found);
    }

    // Strategy 4b: any bare match on or after the anchor line.
    if let Some(found) = lines[anchor..end].iter().find_map(|l| first_document(l)) {
        return Some(found);
    }

    // Strategy 4c: any match in the window taken as one block.
    let block = lines[start..end].join(" ");
    if let Some(found) = first_document(&block) {
        return Some(found);
    }

    // Strategy 5: last resort, anywhere in the page.
    first_document_in_page(text)
}

fn first_document_in_page(text: &str) -> Option<String> {
    patterns::first_cpf(text).or_else(|| patterns::first_cnpj(text))
}

fn nome_field_scan(lines: &[&str]) -> Option<String> {
    for (i, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains("nome:") {
            continue;
        }
        let end = (i + NOME_LOOKAHEAD).min(lines.len());
        for candidate in &lines[i..end] {
            if let Some(found) = first_document(candidate) {
                return Some(found);
            }
        }
    }
    None
}

/// First line where at least two of the name's words appear (one suffices
/// for single-word names), compared after normalization.
fn anchor_line(lines: &[&str], normalized_name: &str) -> Option<usize> {
    let words: Vec<&str> = normalized_name.split(' ').collect();
    let required = if words.len() == 1 { 1 } else { 2 };

    lines.iter().position(|line| {
        let normalized_line = patterns::normalize_name(line);
        words
            .iter()
            .filter(|word| normalized_line.contains(*word))
            .count()
            >= required
    })
}

fn labeled_field_in_window(lines: &[&str], start: usize, end: usize) -> Option<String> {
    for i in start..end {
        if !DOC_LABEL.is_match(lines[i]) {
            continue;
        }
        let nearby = lines[i.saturating_sub(2)..(i + 4).min(lines.len())].join(" ");
        if let Some(found) = first_document(&nearby) {
            return Some(found);
        }
    }
    None
}
