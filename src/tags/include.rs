//! Document directives and inclusion: page setup, taglib imports, static
//! text inclusion at compile time and dispatched inclusion at handling time.

use std::collections::HashMap;

use crate::context::BuildContext;
use crate::error::CompileError;

use super::{require, TagBuilder};

/// Request attribute carrying the active writer across a dispatch.
const WRITER_ATTR: &str = "pagec.writer";

// ═══════════════════════════════════════════════════════════════════════════
// %@ page
// ═══════════════════════════════════════════════════════════════════════════

pub(super) struct PageTagBuilder;

impl TagBuilder for PageTagBuilder {
    fn path(&self) -> &str {
        "%@ page"
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        if let Some(content_type) = attrs.get("contentType") {
            ctx.set_content_type(content_type);
        }
        for key in attrs.keys() {
            if key != "contentType" {
                log::debug!("ignoring page attribute {}", key);
            }
        }
        ctx.set_written(false);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// %@ taglib
// ═══════════════════════════════════════════════════════════════════════════

pub(super) struct TaglibTagBuilder;

impl TagBuilder for TaglibTagBuilder {
    fn path(&self) -> &str {
        "%@ taglib"
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let uri = require(attrs, "uri", self.path())?.to_string();
        let prefix = require(attrs, "prefix", self.path())?.to_string();
        ctx.import_library(&uri, &prefix)?;
        ctx.set_written(false);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// %@include
// ═══════════════════════════════════════════════════════════════════════════

/// Splices another document's text into this compilation. The loaded text
/// is queued and the scanner replays it as if it appeared in place.
pub(super) struct StaticIncludeTagBuilder;

impl TagBuilder for StaticIncludeTagBuilder {
    fn path(&self) -> &str {
        "%@include"
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let file = require(attrs, "file", self.path())?;
        let target = absolute_uri(file, ctx.uri());
        let loader = ctx.loader().ok_or_else(|| {
            CompileError::resource(format!(
                "no resource loader available to include {}",
                target
            ))
        })?;
        let text = loader.load(&target).ok_or_else(|| {
            CompileError::resource(format!("cannot read included file {}", target))
        })?;
        ctx.queue_include(text);
        ctx.set_written(false);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// t:include / t:param
// ═══════════════════════════════════════════════════════════════════════════

pub(super) struct IncludeTagBuilder;

impl TagBuilder for IncludeTagBuilder {
    fn path(&self) -> &str {
        "t:include"
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        standalone: bool,
    ) -> Result<(), CompileError> {
        let page = ctx.build_expression(require(attrs, "page", self.path())?)?;
        let target = format!("$rt.absoluteUri({}, \"{}\")", page.code, ctx.uri());
        if standalone {
            ctx.append_line("try {");
            ctx.incr_tab();
            ctx.append_line(&format!("_c._r.setAttribute(\"{}\", _w);", WRITER_ATTR));
            ctx.append_line(&format!(
                "_c._r.getApplication().dispatcher({}).include(_c._r, _c._re);",
                target
            ));
            ctx.decr_tab();
            ctx.append_line("} finally {");
            ctx.append_line(&format!(
                "    _c._r.removeAttribute(\"{}\");",
                WRITER_ATTR
            ));
            ctx.append_line("}");
        } else {
            // Left open; params accumulate and the end builder dispatches.
            ctx.append_line("try {");
            ctx.incr_tab();
            let dispatcher = ctx.anonymous_name();
            ctx.append_line(&format!("_c._r.setAttribute(\"{}\", _w);", WRITER_ATTR));
            ctx.append_line(&format!(
                "const {} = _c._r.getApplication().dispatcher({});",
                dispatcher, target
            ));
            ctx.set_attribute("include", &dispatcher);
        }
        Ok(())
    }
}

pub(super) struct EndIncludeTagBuilder;

impl TagBuilder for EndIncludeTagBuilder {
    fn path(&self) -> &str {
        "/t:include"
    }

    fn build(
        &self,
        _raw: &str,
        _attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let dispatcher = ctx.take_attribute("include").ok_or_else(|| {
            CompileError::semantic("/t:include without a matching t:include")
        })?;
        ctx.append_line(&format!("{}.include(_c._r, _c._re);", dispatcher));
        ctx.decr_tab();
        ctx.append_line("} finally {");
        ctx.append_line("    _c._r.removeAttribute(\"param\");");
        ctx.append_line(&format!(
            "    _c._r.removeAttribute(\"{}\");",
            WRITER_ATTR
        ));
        ctx.append_line("}");
        Ok(())
    }
}

/// Passes a named value to the included document through a request-scoped
/// map created on first use.
pub(super) struct ParamTagBuilder;

impl TagBuilder for ParamTagBuilder {
    fn path(&self) -> &str {
        "t:param"
    }

    fn build(
        &self,
        _raw: &str,
        attrs: &HashMap<String, String>,
        ctx: &mut BuildContext,
        _standalone: bool,
    ) -> Result<(), CompileError> {
        let name = require(attrs, "name", self.path())?.to_string();
        let value = ctx.build_expression(require(attrs, "value", self.path())?)?;
        ctx.append_line(
            "if (_c._r.getAttribute(\"param\") == null) { _c._r.setAttribute(\"param\", new Map()); }",
        );
        ctx.append_line(&format!(
            "_c._r.getAttribute(\"param\").set(\"{}\", {});",
            name, value.code
        ));
        Ok(())
    }
}

/// Resolve a possibly relative target against the including document's
/// location, folding `../` segments into the base path.
pub fn absolute_uri(target: &str, base: &str) -> String {
    if target.starts_with('/') || base.is_empty() {
        return target.to_string();
    }
    let mut dir = match base.rfind('/') {
        Some(i) => &base[..i],
        None => "",
    };
    let mut rest = target;
    while let Some(stripped) = rest.strip_prefix("../") {
        rest = stripped;
        dir = match dir.rfind('/') {
            Some(i) => &dir[..i],
            None => "",
        };
    }
    format!("{}/{}", dir, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_target_stays_absolute() {
        assert_eq!(absolute_uri("/header.html", "/pages/index.html"), "/header.html");
    }

    #[test]
    fn test_relative_target_resolves_against_base_dir() {
        assert_eq!(
            absolute_uri("header.html", "/pages/index.html"),
            "/pages/header.html"
        );
    }

    #[test]
    fn test_parent_segments_fold_into_base() {
        assert_eq!(
            absolute_uri("../shared/header.html", "/pages/sub/index.html"),
            "/pages/shared/header.html"
        );
    }
}
