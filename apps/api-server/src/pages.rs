//! HTML pages served on the redirect path.

use domain::redirect::WarningKind;
use domain::report::escape_html;

const STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 20px;
        }
        .card {
            background: white;
            border-radius: 16px;
            box-shadow: 0 25px 50px -12px rgba(0, 0, 0, 0.25);
            max-width: 560px;
            width: 100%;
            padding: 32px;
        }
        h1 { font-size: 1.5rem; color: #1e293b; margin-bottom: 12px; }
        p { color: #475569; line-height: 1.5; margin-bottom: 16px; }
        .destination {
            background: #f8fafc;
            border: 1px solid #e2e8f0;
            border-radius: 8px;
            padding: 12px 16px;
            font-family: monospace;
            word-break: break-all;
            color: #0f172a;
            margin-bottom: 24px;
        }
        .btn {
            display: inline-block;
            padding: 12px 24px;
            border-radius: 8px;
            font-weight: 600;
            text-decoration: none;
        }
        .btn-danger { background: #dc2626; color: white; }
        .btn-danger:hover { background: #b91c1c; }
        .btn-secondary { background: #e2e8f0; color: #1e293b; margin-right: 8px; }
        .btn-secondary:hover { background: #cbd5e1; }
"#;

/// Interstitial shown for reported or unconfirmed-external links.
///
/// The continue link points back at this service with `confirmed=1`; the
/// target itself is only rendered as escaped text.
pub fn warning_page(code: &str, target_url: &str, kind: WarningKind) -> String {
    let (title, explanation) = match kind {
        WarningKind::Reported => (
            "This link has been reported",
            "Other visitors reported this short link as possibly harmful (for example phishing \
             or malware). Only continue if you trust the destination.",
        ),
        WarningKind::ExternalUnconfirmed => (
            "You are leaving this site",
            "This short link points to an external site that has not been reviewed. Check the \
             destination before you continue.",
        ),
    };
    let code = escape_html(code);
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="referrer" content="no-referrer">
    <title>Warning - {code}</title>
    <style>{style}</style>
</head>
<body>
    <div class="card">
        <h1>{title}</h1>
        <p>{explanation}</p>
        <div class="destination">{url}</div>
        <a href="/" class="btn btn-secondary">Go back</a>
        <a href="/{code}?confirmed=1" class="btn btn-danger" rel="noreferrer nofollow">Continue to site</a>
    </div>
</body>
</html>"##,
        code = code,
        style = STYLE,
        title = title,
        explanation = explanation,
        url = escape_html(target_url),
    )
}

pub fn not_found_page() -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Link not found</title>
    <style>{style}</style>
</head>
<body>
    <div class="card">
        <h1>Link not found</h1>
        <p>This short link does not exist. Check that it was copied completely.</p>
    </div>
</body>
</html>"##,
        style = STYLE,
    )
}
