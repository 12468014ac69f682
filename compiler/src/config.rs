//! Compiler configuration.
//!
//! A plain struct of the knobs threaded through every phase, built with
//! sane defaults and overridden field-by-field rather than through a
//! builder — there's no FFI-builtin registration surface here, just the
//! handful of limits and names a single-module compile needs.

/// Compile-time knobs threaded through every phase.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Run the optimizer (constant folding, dead-branch elimination, LICM).
    pub optimize: bool,
    /// Parser recursion depth cap (hard cap 1000).
    pub max_recursion_depth: usize,
    /// Loop-context stack depth cap (depth <= 16).
    pub max_loop_nesting: usize,
    /// Size of the compile-time register pool (256 registers).
    pub register_count: usize,
    /// Name attached to diagnostics and the compiled module's globals.
    pub module_name: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            optimize: true,
            max_recursion_depth: 1000,
            max_loop_nesting: 16,
            register_count: 256,
            module_name: "main".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_max_loop_nesting(mut self, depth: usize) -> Self {
        self.max_loop_nesting = depth;
        self
    }

    pub fn with_register_count(mut self, count: usize) -> Self {
        self.register_count = count;
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec() {
        let opts = CompileOptions::default();
        assert!(opts.optimize);
        assert_eq!(opts.max_recursion_depth, 1000);
        assert_eq!(opts.max_loop_nesting, 16);
        assert_eq!(opts.register_count, 256);
    }

    #[test]
    fn builder_methods_chain() {
        let opts = CompileOptions::new()
            .with_optimize(false)
            .with_module_name("script");
        assert!(!opts.optimize);
        assert_eq!(opts.module_name, "script");
    }
}
