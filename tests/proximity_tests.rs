// Behavior of the name-proximity search over annex-page text. The cases
// mirror the layouts the heuristic was tuned against; the strategy order
// is part of the contract.

use processo_cli::docmine::proximity::document_near_name;

const ANNEX_FORM: &str = "Nome: Maria Souza\nCPF: 123.456.789-00";

#[test]
fn nome_field_without_target_name() {
    assert_eq!(
        document_near_name(ANNEX_FORM, None),
        Some("123.456.789-00".to_string())
    );
}

#[test]
fn nome_field_with_matching_name() {
    assert_eq!(
        document_near_name(ANNEX_FORM, Some("Maria Souza")),
        Some("123.456.789-00".to_string())
    );
}

#[test]
fn absent_name_falls_back_to_first_cpf() {
    assert_eq!(
        document_near_name(ANNEX_FORM, Some("Pedro Alves")),
        Some("123.456.789-00".to_string())
    );
}

#[test]
fn no_documents_returns_none() {
    let text = "Anexo II\nRelação de partes\nsem identificadores";
    assert_eq!(document_near_name(text, None), None);
    assert_eq!(document_near_name(text, Some("Maria Souza")), None);
}

#[test]
fn first_document_when_no_name_given() {
    let text = "cabecalho\nCNPJ 12.345.678/0001-90\nrodape";
    assert_eq!(
        document_near_name(text, None),
        Some("12.345.678/0001-90".to_string())
    );
}

#[test]
fn window_search_finds_document_after_anchor_line() {
    let text = "titulo do documento\n\
                dados gerais\n\
                Mauricio Ferreira Leite\n\
                endereco qualquer\n\
                987.654.321-00\n\
                rodape";
    assert_eq!(
        document_near_name(text, Some("Maurício Ferreira Leite")),
        Some("987.654.321-00".to_string())
    );
}

#[test]
fn labeled_field_near_name_wins_inside_window() {
    let text = "111.222.333-44 em outro contexto distante\n\
                linha\nlinha\nlinha\nlinha\nlinha\nlinha\nlinha\n\
                linha\nlinha\nlinha\nlinha\nlinha\nlinha\nlinha\nlinha\n\
                Maria Souza Lima\n\
                C.P.F.: 555.666.777-88";
    assert_eq!(
        document_near_name(text, Some("Maria Souza")),
        Some("555.666.777-88".to_string())
    );
}

#[test]
fn accents_do_not_prevent_anchor_match() {
    let text = "contribuinte MAURICIO FERREIRA\nCPF 123.456.789-00";
    assert_eq!(
        document_near_name(text, Some("Maurício Ferreira")),
        Some("123.456.789-00".to_string())
    );
}

#[test]
fn cnpj_returned_when_only_cnpj_near_name() {
    let text = "Empresa Beta Participações\nCNPJ: 12.345.678/0001-90";
    assert_eq!(
        document_near_name(text, Some("Empresa Beta Participações")),
        Some("12.345.678/0001-90".to_string())
    );
}
