use std::path::Path;
use std::process;

use courseplan_engine::PathHierarchy;

use crate::{read_catalog, report_error, OutputFormat};

pub(crate) fn cmd_check(catalog: &Path, output: OutputFormat, quiet: bool) {
    let doc = read_catalog(catalog, output, quiet);

    // Document-level checks passed; the trees still need building.
    let courses = doc.courses.len();
    let programmes = doc.programmes.len();
    let paths = doc.paths.len();
    if let Err(e) = PathHierarchy::build(doc.programmes, doc.paths) {
        report_error(&format!("{}: {}", catalog.display(), e), output, quiet);
        process::exit(1);
    }

    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!(
                "ok: {} courses, {} programmes, {} requirement paths",
                courses, programmes, paths
            );
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "status": "ok",
                "courses": courses,
                "programmes": programmes,
                "paths": paths,
            });
            println!("{}", result);
        }
    }
}
