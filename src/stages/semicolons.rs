use oxc_ast::ast::Statement;

use crate::diagnostics::PipelineError;
use crate::edit::Edit;
use crate::parse::with_program;
use crate::stage::StageContext;

const STAGE: &str = "trailing-semicolons";

/// Removes stray top-level `;` statements.
pub fn cleanup(code: &str, _ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    with_program(code, STAGE, |program| {
        let edits = program
            .body
            .iter()
            .filter_map(|stmt| match stmt {
                Statement::EmptyStatement(empty) if follows_terminator(code, empty.span.start) => {
                    Some(Edit::remove(empty.span))
                }
                _ => None,
            })
            .collect();
        Ok(edits)
    })
}

/// A lone `;` is only dropped after a `;` or `}` (or at the very start), so
/// removing it can never join two statements.
fn follows_terminator(code: &str, offset: u32) -> bool {
    match code[..offset as usize].trim_end().chars().last() {
        None => true,
        Some(c) => c == ';' || c == '}',
    }
}
