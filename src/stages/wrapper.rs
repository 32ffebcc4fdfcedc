use crate::stage::ExternContext;

/// Declares the iife/umd wrapper global so the optimizer keeps it.
pub fn externs(ctx: &ExternContext<'_>) -> Option<String> {
    if !ctx.options.format.has_global_wrapper() {
        return None;
    }
    let name = ctx.options.name.as_deref()?.trim();
    if name.is_empty() {
        return None;
    }
    // `a.b.c` only needs its root declared; the properties hang off it.
    match name.split_once('.') {
        Some((root, _)) => Some(format!("var {};\n", root)),
        None => Some(format!("function {}(){{}};\n", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CompileOptions, OutputFormat};
    use crate::stages::testing::Harness;

    fn stub(format: OutputFormat, name: Option<&str>) -> Option<String> {
        let mut options = CompileOptions::new(format);
        options.name = name.map(str::to_string);
        let h = Harness::new(options);
        externs(&h.extern_context())
    }

    #[test]
    fn test_wrapper_stub() {
        assert_eq!(
            stub(OutputFormat::Iife, Some("MyLib")).as_deref(),
            Some("function MyLib(){};\n")
        );
        assert_eq!(
            stub(OutputFormat::Umd, Some("ns.lib")).as_deref(),
            Some("var ns;\n")
        );
    }

    #[test]
    fn test_no_stub_without_wrapper() {
        assert_eq!(stub(OutputFormat::Es, Some("MyLib")), None);
        assert_eq!(stub(OutputFormat::Iife, None), None);
    }
}
