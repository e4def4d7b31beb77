//! `parley tools`: list configured tools.

use std::path::Path;
use std::process::ExitCode;

use parley_core::tool::{ParamType, ToolParameter};

use super::{CmdResult, build_dispatcher, load_config};

pub fn run(config_path: Option<&Path>) -> CmdResult<ExitCode> {
    let config = load_config(config_path)?;
    let dispatcher = build_dispatcher(&config)?;

    if dispatcher.registry().is_empty() {
        println!("No tools configured.");
        println!("Declare them under [[tools]] in {}", super::config_cmd::config_file(config_path).display());
        return Ok(ExitCode::SUCCESS);
    }

    for (tool, http) in dispatcher.registry().iter().zip(&config.tools) {
        println!("{}  ->  POST {}", tool.name, http.url);
        println!("    {}", tool.description);
        for param in &tool.parameters {
            println!("    - {}", describe(param));
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}

fn describe(param: &ToolParameter) -> String {
    let kind = match &param.kind {
        ParamType::String => "string".to_string(),
        ParamType::Integer => "integer".to_string(),
        ParamType::Object { fields } => {
            let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            format!("object {{{}}}", names.join(", "))
        }
    };
    let required = if param.required { "" } else { ", optional" };
    format!("{} ({kind}{required}): {}", param.name, param.description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_parameters() {
        let p = ToolParameter::integer("limit", "max rows").optional();
        assert_eq!(describe(&p), "limit (integer, optional): max rows");
        let p = ToolParameter::string("query", "SQL");
        assert_eq!(describe(&p), "query (string): SQL");
    }
}
