use oxc_ast::ast::{VariableDeclaration, VariableDeclarationKind};
use oxc_ast_visit::{walk, Visit};

use crate::diagnostics::PipelineError;
use crate::edit::{Edit, SyntaxRange};
use crate::parse::with_program;
use crate::stage::StageContext;

const STAGE: &str = "declarations";

/// Rewrites every `const` keyword to `let`.
pub fn normalize(code: &str, _ctx: &mut StageContext<'_>) -> Result<Vec<Edit>, PipelineError> {
    with_program(code, STAGE, |program| {
        let mut finder = ConstFinder { edits: Vec::new() };
        finder.visit_program(program);
        Ok(finder.edits)
    })
}

struct ConstFinder {
    edits: Vec<Edit>,
}

impl<'a> Visit<'a> for ConstFinder {
    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration<'a>) {
        if decl.kind == VariableDeclarationKind::Const {
            let keyword = SyntaxRange::new(decl.span.start, decl.span.start + "const".len() as u32);
            self.edits.push(Edit::overwrite(keyword, "let"));
        }
        walk::walk_variable_declaration(self, decl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::stages::testing::Harness;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_const_becomes_let_everywhere() {
        let mut h = Harness::new(CompileOptions::default());
        let out = h
            .run(
                normalize,
                "const a = 1;\nfunction f() { for (const x of xs) { const y = x; } }\nexport const b = 'const';",
            )
            .unwrap();
        assert_eq!(
            out,
            "let a = 1;\nfunction f() { for (let x of xs) { let y = x; } }\nexport let b = 'const';"
        );
    }

    #[test]
    fn test_let_and_var_untouched() {
        let mut h = Harness::new(CompileOptions::default());
        let src = "let a = 1; var b = 2;";
        assert_eq!(h.run(normalize, src).unwrap(), src);
    }
}
