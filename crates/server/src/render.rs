//! HTML for the upload form, the result page and error pages.

use orden_core::ExtractedRecord;

/// Everything the result section of the page shows.
pub struct ResultView<'a> {
    pub preview_png_b64: &'a str,
    pub records: &'a [ExtractedRecord],
    pub csv_b64: &'a str,
    pub ocr_text: &'a str,
}

const STYLE: &str = r#"
    body{font-family:system-ui, -apple-system, Segoe UI, Roboto, Arial; margin: 32px;}
    .card{max-width:980px;margin:auto;padding:24px;border:1px solid #e5e7eb;border-radius:16px;box-shadow:0 8px 24px rgba(0,0,0,.06)}
    h1{margin:0 0 16px;font-size:22px}
    .hint{color:#6b7280;margin-bottom:16px}
    .drop{border:2px dashed #cbd5e1;padding:24px;border-radius:12px;text-align:center}
    table{border-collapse:collapse;width:100%;margin-top:16px}
    th,td{border:1px solid #e5e7eb;padding:10px 12px;text-align:left}
    th{background:#f8fafc}
    .btn{display:inline-block;background:#2563eb;color:#fff;padding:10px 16px;border-radius:10px;text-decoration:none;border:none;cursor:pointer}
    .row{display:flex;gap:12px;flex-wrap:wrap;align-items:center}
    .pill{background:#eef2ff;color:#3730a3;padding:4px 10px;border-radius:999px;font-size:12px}
    .error{background:#fef2f2;color:#991b1b;padding:12px 16px;border-radius:12px;margin-top:16px}
    img{max-width:100%;height:auto;border-radius:12px;margin-top:12px}
    .grid{display:grid;grid-template-columns:1fr 1fr;gap:20px;margin-top:8px}
    @media (max-width: 800px){.grid{grid-template-columns:1fr}}
"#;

/// The upload form, optionally followed by a result or an error message.
pub fn page(result: Option<&ResultView<'_>>, error: Option<&str>) -> String {
    let body = match (result, error) {
        (Some(view), _) => result_section(view),
        (None, Some(message)) => format!(r#"<div class="error">{}</div>"#, html_escape(message)),
        (None, None) => String::new(),
    };

    format!(
        r#"<!doctype html>
<html lang="es">
<head>
  <meta charset="utf-8">
  <title>OCR Orden → Tabla</title>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <style>{STYLE}</style>
</head>
<body>
  <div class="card">
    <h1>Extraer datos de Orden (Imagen → Tabla)</h1>
    <p class="hint">Sube una captura de la orden (por ejemplo, Mercado Libre). El sistema hará OCR y te devolverá la tabla.</p>
    <form class="drop" action="/" method="post" enctype="multipart/form-data">
      <input type="file" name="image" accept="image/*" required>
      <br><br>
      <button class="btn" type="submit">Procesar</button>
    </form>
{body}
  </div>
</body>
</html>"#
    )
}

fn result_section(view: &ResultView<'_>) -> String {
    format!(
        r#"    <div class="grid">
      <div>
        <h3>Vista previa</h3>
        <img src="data:image/png;base64,{preview}">
      </div>
      <div>
        <h3>Tabla detectada</h3>
        {table}
        <div style="margin-top:12px" class="row">
          <form method="post" action="/download">
            <input type="hidden" name="csv" value="{csv}">
            <button class="btn" type="submit">Descargar CSV</button>
          </form>
          <span class="pill">Filas: {rows}</span>
        </div>
        <details style="margin-top:14px">
          <summary>Texto OCR (depuración)</summary>
          <pre style="white-space:pre-wrap">{ocr}</pre>
        </details>
      </div>
    </div>"#,
        preview = html_escape(view.preview_png_b64),
        table = record_table(view.records),
        csv = html_escape(view.csv_b64),
        rows = view.records.len(),
        ocr = html_escape(view.ocr_text),
    )
}

/// Records as an HTML table with one header row.
pub fn record_table(records: &[ExtractedRecord]) -> String {
    let header = ExtractedRecord::HEADERS
        .iter()
        .map(|h| format!("<th>{}</th>", html_escape(h)))
        .collect::<String>();
    let rows = records
        .iter()
        .map(|r| {
            let cells = r
                .values()
                .iter()
                .map(|v| format!("<td>{}</td>", html_escape(v)))
                .collect::<String>();
            format!("<tr>{cells}</tr>")
        })
        .collect::<String>();
    format!(r#"<table class="dataframe"><thead><tr>{header}</tr></thead><tbody>{rows}</tbody></table>"#)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
