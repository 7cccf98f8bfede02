// Writer behavior over real workbook files in the temp dir: append/persist
// semantics, schema evolution and the failure-to-sentinel-row contract.

use std::fs;
use std::path::PathBuf;

use processo_cli::esaj::case_number::split_case_number;
use processo_cli::faillog::FailureLog;
use processo_cli::report::{
    next_output_path, CaseRecord, CellValue, ReportWriter, Sheet, CANONICAL_HEADERS,
};

fn temp_file(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("processo-cli-{}-{}", std::process::id(), name));
    let _ = fs::remove_file(&path);
    path
}

#[test]
fn creates_workbook_with_canonical_header() {
    let path = temp_file("header.xlsx");

    ReportWriter::open(&path).unwrap();
    assert!(path.exists());

    let sheet = Sheet::load(&path).unwrap();
    assert_eq!(
        sheet.headers,
        CANONICAL_HEADERS
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
    );
    assert!(sheet.rows.is_empty());

    let _ = fs::remove_file(&path);
}

#[test]
fn same_case_twice_produces_two_rows() {
    let path = temp_file("duplicates.xlsx");

    let mut writer = ReportWriter::open(&path).unwrap();
    let record = CaseRecord::ok("0044370-60.2018.8.26.0500");
    writer.append_case(&record).unwrap();
    writer.append_case(&record).unwrap();

    let sheet = Sheet::load(&path).unwrap();
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(sheet.cell_text(0, 0), "0044370-60.2018.8.26.0500");
    assert_eq!(sheet.cell_text(1, 0), "0044370-60.2018.8.26.0500");

    let _ = fs::remove_file(&path);
}

#[test]
fn dynamic_party_columns_are_never_duplicated() {
    let path = temp_file("dynamic.xlsx");

    let mut record = CaseRecord::ok("123");
    record.outras_partes = vec![(
        "Invitante".to_string(),
        "Construtora Delta S/A".to_string(),
        "Advogado: Dr. Pedro Luz".to_string(),
    )];

    let mut writer = ReportWriter::open(&path).unwrap();
    writer.append_case(&record).unwrap();
    writer.append_case(&record).unwrap();

    let sheet = Sheet::load(&path).unwrap();
    let invitante_cols = sheet.headers.iter().filter(|h| *h == "Invitante").count();
    let advogados_cols = sheet
        .headers
        .iter()
        .filter(|h| *h == "ADVOGADOS INVITANTE")
        .count();
    assert_eq!(invitante_cols, 1);
    assert_eq!(advogados_cols, 1);

    // Inserted right after the fixed anchor, attorneys right after the type.
    let anchor = sheet.column_index("ADVOGADOS DEVEDOR").unwrap();
    assert_eq!(sheet.column_index("Invitante"), Some(anchor + 1));
    assert_eq!(sheet.column_index("ADVOGADOS INVITANTE"), Some(anchor + 2));

    let invitante = sheet.column_index("Invitante").unwrap();
    assert_eq!(sheet.cell_text(0, invitante), "Construtora Delta S/A");
    assert_eq!(sheet.cell_text(1, invitante), "Construtora Delta S/A");

    let _ = fs::remove_file(&path);
}

#[test]
fn pdf_link_survives_reload_as_formula() {
    let path = temp_file("formula.xlsx");

    let mut record = CaseRecord::ok("123");
    record.caminho_pdf = Some(PathBuf::from("/tmp/downloads/123.pdf"));

    let mut writer = ReportWriter::open(&path).unwrap();
    writer.append_case(&record).unwrap();

    let sheet = Sheet::load(&path).unwrap();
    let pdf_col = sheet.column_index("PDF").unwrap();
    match &sheet.rows[0][pdf_col] {
        CellValue::Formula(formula) => {
            assert!(formula.contains("HYPERLINK"));
            assert!(formula.contains("/tmp/downloads/123.pdf"));
        }
        other => panic!("expected formula cell, got {:?}", other),
    }

    let _ = fs::remove_file(&path);
}

// One valid and one malformed case number: the malformed one becomes the
// full sentinel row, both land in the output, and the failure is logged.
#[test]
fn malformed_case_becomes_sentinel_row_and_is_logged() {
    let path = temp_file("sentinel.xlsx");
    let log_path = temp_file("sentinel.log");
    let faillog = FailureLog::new(&log_path);

    let processos = ["0044370-60.2018.8.26.0500", "123-45"];
    let mut writer = ReportWriter::open(&path).unwrap();

    for processo in processos {
        let record = match split_case_number(processo) {
            Ok(_) => CaseRecord::ok(processo),
            Err(err) => {
                let mensagem = err.to_string();
                faillog.record(processo, &mensagem).unwrap();
                CaseRecord::error(processo, &mensagem)
            }
        };
        writer.append_case(&record).unwrap();
    }

    let sheet = Sheet::load(&path).unwrap();
    assert_eq!(sheet.rows.len(), 2);

    let status = sheet.column_index("Status").unwrap();
    let classe = sheet.column_index("Classe").unwrap();
    let movimentacoes = sheet.column_index("Movimentacoes").unwrap();
    let pdf = sheet.column_index("PDF").unwrap();

    assert_eq!(sheet.cell_text(0, status), "OK");
    assert_eq!(sheet.cell_text(1, status), "ERRO");
    assert_eq!(sheet.cell_text(1, classe), "Erro ou não encontrado");
    assert!(sheet.cell_text(1, movimentacoes).contains("123-45"));
    assert_eq!(sheet.cell_text(1, pdf), "Não baixado");

    let log = fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("Falha no processo 123-45"));

    let _ = fs::remove_file(&path);
    let _ = fs::remove_file(&log_path);
}

#[test]
fn appending_to_existing_workbook_preserves_previous_rows() {
    let path = temp_file("reopen.xlsx");

    {
        let mut writer = ReportWriter::open(&path).unwrap();
        writer.append_case(&CaseRecord::ok("111")).unwrap();
    }
    {
        let mut writer = ReportWriter::open(&path).unwrap();
        writer.append_case(&CaseRecord::ok("222")).unwrap();
    }

    let sheet = Sheet::load(&path).unwrap();
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(sheet.cell_text(0, 0), "111");
    assert_eq!(sheet.cell_text(1, 0), "222");

    let _ = fs::remove_file(&path);
}

#[test]
fn output_names_auto_increment() {
    let dir = std::env::temp_dir().join(format!("processo-cli-inc-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();

    let first = next_output_path(&dir, "resultados_processos");
    assert!(first.ends_with("resultados_processos_1.xlsx"));

    fs::write(&first, b"x").unwrap();
    let second = next_output_path(&dir, "resultados_processos");
    assert!(second.ends_with("resultados_processos_2.xlsx"));

    let _ = fs::remove_dir_all(&dir);
}
