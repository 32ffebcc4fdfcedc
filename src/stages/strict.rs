use crate::diagnostics::PipelineError;
use crate::edit::Edit;
use crate::parse::with_program;
use crate::stage::StageContext;
use crate::stages::statement_line;

const STAGE: &str = "strict-directive";
const USE_STRICT: &str = "use strict";

/// Drops a leading `'use strict'` when the output format is strict anyway.
/// Only the first directive of the program is considered.
pub fn strip(code: &str, ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    if !ctx.options.format.implies_strict() {
        return Ok(vec![]);
    }
    with_program(code, STAGE, |program| {
        match program.directives.first() {
            Some(first) if first.directive.as_str() == USE_STRICT => {
                Ok(vec![Edit::remove(statement_line(code, first.span))])
            }
            _ => Ok(vec![]),
        }
    })
}
