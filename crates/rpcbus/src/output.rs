use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcbus_core::{signature_field, ParamDirection, SignalEvent};
use rpcbus_value::Value;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ObjectListing {
    pub object: String,
    pub methods: Vec<MethodListing>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MethodListing {
    pub method: String,
    #[serde(rename = "in")]
    pub inputs: Vec<ParamListing>,
    #[serde(rename = "out")]
    pub outputs: Vec<ParamListing>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ParamListing {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl ParamListing {
    fn label(&self) -> String {
        format!("{}:{}", self.name, self.ty)
    }
}

/// Decode the flat `[name, methods, name, methods, ...]` reply of the
/// server's list method. A trailing name without a method table is ignored.
pub fn parse_listing(listing: &Value) -> Vec<ObjectListing> {
    listing
        .children()
        .chunks_exact(2)
        .filter_map(|pair| {
            let object = pair[0].as_str()?.to_string();
            let methods = pair[1]
                .entries()
                .map(|(method, signature)| {
                    let mut entry = MethodListing {
                        method: method.to_string(),
                        inputs: Vec::new(),
                        outputs: Vec::new(),
                    };
                    for (direction, name, ty) in
                        signature.children().iter().filter_map(signature_field)
                    {
                        let param = ParamListing {
                            name: name.to_string(),
                            ty: ty.to_string(),
                        };
                        match direction {
                            ParamDirection::In => entry.inputs.push(param),
                            ParamDirection::Out => entry.outputs.push(param),
                        }
                    }
                    entry
                })
                .collect();
            Some(ObjectListing { object, methods })
        })
        .collect()
}

pub fn print_listing(objects: &[ObjectListing], format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(&objects)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OBJECT", "METHOD", "IN", "OUT"]);
            for object in objects {
                if object.methods.is_empty() {
                    table.add_row(vec![object.object.clone(), String::new(), String::new(), String::new()]);
                }
                for method in &object.methods {
                    table.add_row(vec![
                        object.object.clone(),
                        method.method.clone(),
                        join_params(&method.inputs),
                        join_params(&method.outputs),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for object in objects {
                println!("{}", object.object);
                for method in &object.methods {
                    println!(
                        "  {}({}) -> ({})",
                        method.method,
                        join_params(&method.inputs),
                        join_params(&method.outputs)
                    );
                }
            }
        }
    }
}

/// Print a call result. Tables have no natural row shape, so the table
/// format falls back to indented JSON.
pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(value)),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
        ),
    }
}

#[derive(Serialize)]
struct SignalOutput<'a> {
    peer: u32,
    name: &'a str,
    args: &'a [Value],
}

pub fn print_signal(event: &SignalEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SignalOutput {
                peer: event.peer,
                name: &event.name,
                args: &event.args,
            };
            println!("{}", to_json_line(&out));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "SIGNAL", "ARGS"])
                .add_row(vec![
                    event.peer.to_string(),
                    event.name.clone(),
                    to_json_line(&event.args),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "peer={} signal={} args={}",
                event.peer,
                event.name,
                to_json_line(&event.args)
            );
        }
    }
}

fn join_params(params: &[ParamListing]) -> String {
    params
        .iter()
        .map(ParamListing::label)
        .collect::<Vec<_>>()
        .join(", ")
}

fn to_json_line<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}
