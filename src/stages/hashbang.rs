use lazy_static::lazy_static;
use regex::Regex;

use crate::diagnostics::PipelineError;
use crate::edit::{Edit, SyntaxRange};
use crate::stage::StageContext;

lazy_static! {
    static ref HASHBANG_RE: Regex = Regex::new(r"^#![^\r\n]*(\r?\n)?").unwrap();
}

/// Removes a leading interpreter line; the parser rejects it.
pub fn extract(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    let Some(found) = HASHBANG_RE.find(code) else {
        return Ok(vec![]);
    };
    let line = found.as_str().trim_end_matches(['\r', '\n']);
    log::debug!("{}: extracted hashbang `{}`", ctx.file_name, line);
    ctx.memory.hashbang = Some(line.to_string());
    Ok(vec![Edit::remove(SyntaxRange::new(0, found.end() as u32))])
}

pub fn reinsert(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    let Some(line) = &ctx.memory.hashbang else {
        return Ok(vec![]);
    };
    if code.starts_with(line.as_str()) {
        return Ok(vec![]);
    }
    Ok(vec![Edit::append_before(SyntaxRange::at(0), format!("{}\n", line))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::stages::testing::Harness;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_and_reinsert() {
        let mut h = Harness::new(CompileOptions::default());
        let pre = h.run(extract, "#!/usr/bin/env node\nconsole.log(1);\n").unwrap();
        assert_eq!(pre, "console.log(1);\n");
        assert_eq!(h.memory.hashbang.as_deref(), Some("#!/usr/bin/env node"));

        let post = h.run(reinsert, "console.log(1);").unwrap();
        assert_eq!(post, "#!/usr/bin/env node\nconsole.log(1);");
    }

    #[test]
    fn test_no_hashbang_is_noop() {
        let mut h = Harness::new(CompileOptions::default());
        assert_eq!(h.run(extract, "a();\n#!x").unwrap(), "a();\n#!x");
        assert!(h.memory.hashbang.is_none());
        assert_eq!(h.run(reinsert, "a();").unwrap(), "a();");
    }

    #[test]
    fn test_hashbang_without_trailing_code() {
        let mut h = Harness::new(CompileOptions::default());
        assert_eq!(h.run(extract, "#!/bin/node").unwrap(), "");
        assert_eq!(h.memory.hashbang.as_deref(), Some("#!/bin/node"));
    }

    #[test]
    fn test_reinsert_is_idempotent() {
        let mut h = Harness::new(CompileOptions::default());
        h.memory.hashbang = Some("#!/usr/bin/env node".into());
        let once = h.run(reinsert, "x();").unwrap();
        let twice = h.run(reinsert, &once).unwrap();
        assert_eq!(once, twice);
    }
}
