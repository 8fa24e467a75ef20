//! Final source rendering.
//!
//! Assembles the accumulated context members, fragment bodies and the root
//! service body into one handler source unit: a context class holding the
//! request plumbing and hoisted accessors, one class per deferred fragment,
//! and the handler class with its `init`/`destroy`/`service` surface.

use serde::{Deserialize, Serialize};

use crate::context::BuildContext;

/// The product of a compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub class_name: String,
    pub source: String,
}

pub fn render(ctx: &BuildContext) -> CompiledUnit {
    let name = ctx.class_name().to_string();
    let mut src = String::new();

    src.push_str(&format!("// Generated from {}\n\n", ctx.uri()));

    // Handling context: request plumbing plus hoisted accessors.
    src.push_str(&format!("class Ctx{} {{\n", name));
    src.push_str("    constructor(request, response) {\n");
    src.push_str("        this._r = request;\n");
    src.push_str("        this._re = response;\n");
    src.push_str("        this._out = response.getWriter();\n");
    src.push_str("    }\n\n");
    src.push_str("    out() {\n        return this._out;\n    }\n\n");
    src.push_str("    params() {\n        return $rt.params(this._r);\n    }\n\n");
    src.push_str("    release() {\n        $rt.release(this);\n    }\n\n");
    src.push_str(ctx.members());
    src.push_str("}\n\n");

    // Deferred bodies, oldest first.
    for fragment in ctx.fragments().iter().skip(1) {
        src.push_str(&format!("class {} {{\n", fragment.name));
        src.push_str("    constructor(c) {\n        this._c = c;\n    }\n\n");
        src.push_str("    invoke(_w) {\n");
        src.push_str("        const _c = this._c;\n");
        src.push_str(&fragment.buf);
        src.push_str("    }\n");
        src.push_str("}\n\n");
    }

    // The handler itself.
    src.push_str(&format!("class {} {{\n", name));
    src.push_str("    init(config) {\n        this._config = config;\n    }\n\n");
    src.push_str("    destroy() {\n    }\n\n");
    src.push_str(&format!(
        "    info() {{\n        return \"handler of {}\";\n    }}\n\n",
        ctx.uri()
    ));
    src.push_str("    service(request, response) {\n");
    if let Some(content_type) = ctx.content_type() {
        src.push_str(&format!(
            "        response.setContentType(\"{}\");\n",
            content_type
        ));
    }
    src.push_str(&format!(
        "        const _c = new Ctx{}(request, response);\n",
        name
    ));
    src.push_str("        try {\n");
    src.push_str("            const _w = _c.out();\n");
    src.push_str(&ctx.fragments()[0].buf);
    src.push_str("            _w.flush();\n");
    src.push_str("        } finally {\n");
    src.push_str("            _c.release();\n");
    src.push_str("        }\n");
    src.push_str("    }\n");
    src.push_str("}\n");

    CompiledUnit {
        class_name: name,
        source: src,
    }
}
