use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use schemaforge_config::{DEFAULT_ALLOWED_MODULES, ForgeConfig, LimitsConfig};
use schemaforge_core::{ErrorKind, ForgeError, ForgeResult, Pipeline};

fn run(source: &str) -> Result<(Value, String, Vec<String>)> {
    let extraction = Pipeline::default().run(source)?;
    Ok((extraction.schema, extraction.model_name, extraction.all_models))
}

fn failure(source: &str) -> ForgeError {
    match Pipeline::default().run(source) {
        Ok(extraction) => panic!("expected a failure, got {}", extraction.model_name),
        Err(err) => err,
    }
}

#[test]
fn single_model_with_optional_field() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
from pydantic import BaseModel
from typing import Optional

class User(BaseModel):
    name: str
    age: Optional[int] = None
"#)?;
    assert_eq!(model_name, "User");
    assert_eq!(all_models, vec!["User"]);
    assert_eq!(
        schema,
        json!({
            "properties": {
                "name": {"title": "Name", "type": "string"},
                "age": {
                    "anyOf": [{"type": "integer"}, {"type": "null"}],
                    "default": null,
                    "title": "Age"
                }
            },
            "required": ["name"],
            "title": "User",
            "type": "object"
        })
    );
    Ok(())
}

#[test]
fn last_declared_model_is_selected() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
class Address(BaseModel):
    street: str

class Item(BaseModel):
    sku: str

class Order(BaseModel):
    address: Address
    items: List[Item] = []
"#)?;
    assert_eq!(model_name, "Order");
    assert_eq!(all_models, vec!["Address", "Item", "Order"]);
    assert_eq!(
        schema,
        json!({
            "$defs": {
                "Address": {
                    "properties": {"street": {"title": "Street", "type": "string"}},
                    "required": ["street"],
                    "title": "Address",
                    "type": "object"
                },
                "Item": {
                    "properties": {"sku": {"title": "Sku", "type": "string"}},
                    "required": ["sku"],
                    "title": "Item",
                    "type": "object"
                }
            },
            "properties": {
                "address": {"$ref": "#/$defs/Address"},
                "items": {
                    "default": [],
                    "items": {"$ref": "#/$defs/Item"},
                    "title": "Items",
                    "type": "array"
                }
            },
            "required": ["address"],
            "title": "Order",
            "type": "object"
        })
    );
    Ok(())
}

#[test]
fn disallowed_import_is_rejected() {
    let err = failure("import os\n");
    assert_eq!(err.kind(), ErrorKind::ImportDenied);
    let result = ForgeResult::from(&err);
    assert_eq!(result.exit_code(), 1);
    assert_eq!(
        serde_json::from_str::<Value>(&result.render(false)).ok(),
        Some(json!({
            "error": "Failed to execute Pydantic code: Import of 'os' is not allowed. Only pydantic, typing, and standard lib types are permitted."
        }))
    );

    let err = failure("from subprocess import run\nclass A(BaseModel):\n    x: int\n");
    assert_eq!(err.kind(), ErrorKind::ImportDenied);
    assert!(err.to_string().contains("'subprocess'"));
}

#[test]
fn imports_made_by_allowed_modules_are_guarded_too() {
    let mut config = ForgeConfig::default();
    config.sandbox.allowed_modules = DEFAULT_ALLOWED_MODULES
        .iter()
        .filter(|module| **module != "annotated_types")
        .map(|module| (*module).to_string())
        .collect();
    let err = match Pipeline::from_config(&config).run("class A(BaseModel):\n    x: int\n") {
        Ok(_) => panic!("pydantic loads annotated_types while importing"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::EnvironmentUnavailable);
    assert_eq!(
        err.to_string(),
        "Failed to import pydantic: Import of 'annotated_types' is not allowed. Only pydantic, typing, and standard lib types are permitted.. Ensure pydantic>=2 is installed."
    );
}

#[test]
fn extra_modules_extend_the_allowlist() -> Result<()> {
    let mut config = ForgeConfig::default();
    config.sandbox.allowed_modules = vec!["pydantic".into()];
    config.sandbox.extra_allowed_modules = DEFAULT_ALLOWED_MODULES
        .iter()
        .map(|module| (*module).to_string())
        .collect();
    let extraction = Pipeline::from_config(&config).run("class A(BaseModel):\n    x: int\n")?;
    assert_eq!(extraction.model_name, "A");
    Ok(())
}

#[test]
fn blank_input_is_rejected() {
    for source in ["", "   ", "\n\t\n"] {
        let err = failure(source);
        assert_eq!(err, ForgeError::EmptyInput);
        assert_eq!(
            ForgeResult::from(&err).render(false),
            r#"{"error":"No input provided"}"#
        );
    }
}

#[test]
fn source_without_models_reports_no_model() {
    let err = failure("def build():\n    return 1\n\nVALUE = build\n");
    assert_eq!(err.kind(), ErrorKind::NoModelFound);
    assert_eq!(
        err.to_string(),
        "No BaseModel subclass found in the provided code."
    );
}

#[test]
fn repeated_runs_render_identical_output() {
    let source = r#"
from enum import Enum

class Color(Enum):
    RED = "red"
    GREEN = "green"

class Paint(BaseModel):
    """A can of paint."""
    color: Color = Color.RED
    litres: float = Field(gt=0, description="Volume")
    tags: Dict[str, int] = {}
"#;
    let render = || ForgeResult::from_outcome(Pipeline::default().run(source)).render(false);
    let first = render();
    assert_eq!(first, render());
    assert_eq!(
        first,
        concat!(
            r##"{"schema":{"$defs":{"Color":{"enum":["red","green"],"title":"Color","type":"string"}},"##,
            r##""description":"A can of paint.","properties":{"color":{"$ref":"#/$defs/Color","default":"red"},"##,
            r##""litres":{"description":"Volume","exclusiveMinimum":0,"title":"Litres","type":"number"},"##,
            r##""tags":{"additionalProperties":{"type":"integer"},"default":{},"title":"Tags","type":"object"}},"##,
            r##""required":["litres"],"title":"Paint","type":"object"},"modelName":"Paint","allModels":["Paint"]}"##
        )
    );
}

#[test]
fn constraints_and_literals() -> Result<()> {
    let (schema, _, _) = run(r#"
from typing import Annotated, Literal

class Account(BaseModel):
    handle: str = Field(min_length=3, max_length=20, pattern="^[a-z]+$")
    age: Annotated[int, Field(ge=0, le=150)]
    plan: Literal["free", "pro"] = "free"
    kind: Literal["account"] = "account"
"#)?;
    assert_eq!(
        schema.get("properties"),
        Some(&json!({
            "handle": {
                "maxLength": 20,
                "minLength": 3,
                "pattern": "^[a-z]+$",
                "title": "Handle",
                "type": "string"
            },
            "age": {"maximum": 150, "minimum": 0, "title": "Age", "type": "integer"},
            "plan": {"default": "free", "enum": ["free", "pro"], "title": "Plan", "type": "string"},
            "kind": {"const": "account", "default": "account", "title": "Kind", "type": "string"}
        }))
    );
    assert_eq!(schema.get("required"), Some(&json!(["handle", "age"])));
    Ok(())
}

#[test]
fn self_referencing_model_is_a_reference() -> Result<()> {
    let (schema, model_name, _) = run(r#"
class Node(BaseModel):
    value: int
    children: List["Node"] = []
"#)?;
    assert_eq!(model_name, "Node");
    assert_eq!(
        schema,
        json!({
            "$defs": {
                "Node": {
                    "properties": {
                        "value": {"title": "Value", "type": "integer"},
                        "children": {
                            "default": [],
                            "items": {"$ref": "#/$defs/Node"},
                            "title": "Children",
                            "type": "array"
                        }
                    },
                    "required": ["value"],
                    "title": "Node",
                    "type": "object"
                }
            },
            "$ref": "#/$defs/Node"
        })
    );
    Ok(())
}

#[test]
fn undefined_forward_reference_fails_derivation() {
    let err = failure("class Holder(BaseModel):\n    item: \"Missing\"\n");
    assert_eq!(err.kind(), ErrorKind::SchemaDerivationFailed);
    assert_eq!(
        err.to_string(),
        "Failed to generate JSON Schema from Holder: `Holder` is not fully defined; you should define `Missing`, then call `Holder.model_rebuild()`."
    );
}

#[test]
fn inherited_fields_come_first() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
from pydantic import ConfigDict

class Base(BaseModel):
    id: int

class User(Base):
    model_config = ConfigDict(extra="forbid")
    name: str
"#)?;
    assert_eq!(model_name, "User");
    assert_eq!(all_models, vec!["Base", "User"]);
    assert_eq!(
        schema,
        json!({
            "additionalProperties": false,
            "properties": {
                "id": {"title": "Id", "type": "integer"},
                "name": {"title": "Name", "type": "string"}
            },
            "required": ["id", "name"],
            "title": "User",
            "type": "object"
        })
    );
    Ok(())
}

#[test]
fn private_and_rebound_names_are_not_models() -> Result<()> {
    let (_, model_name, all_models) = run(r#"
class _Internal(BaseModel):
    x: int

class Public(BaseModel):
    y: int

class Later(BaseModel):
    z: int

Later = None
"#)?;
    assert_eq!(model_name, "Public");
    assert_eq!(all_models, vec!["Public"]);
    Ok(())
}

#[test]
fn redeclared_model_keeps_its_first_position() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
class A(BaseModel):
    x: int

class B(BaseModel):
    y: str

class A(BaseModel):
    z: float
"#)?;
    assert_eq!(model_name, "B");
    assert_eq!(all_models, vec!["A", "B"]);
    assert_eq!(schema.get("title"), Some(&json!("B")));
    Ok(())
}

#[test]
fn alias_bindings_are_models_too() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
class User(BaseModel):
    x: int

Main = User
"#)?;
    assert_eq!(model_name, "Main");
    assert_eq!(all_models, vec!["User", "Main"]);
    assert_eq!(schema.get("title"), Some(&json!("User")));
    Ok(())
}

#[test]
fn root_models_describe_their_root_type() -> Result<()> {
    let (schema, model_name, all_models) = run(r#"
from pydantic import RootModel

class Tags(RootModel[List[str]]):
    """Free-form labels."""

class Post(BaseModel):
    tags: Tags
"#)?;
    assert_eq!(model_name, "Post");
    assert_eq!(all_models, vec!["Tags", "Post"]);
    assert_eq!(
        schema,
        json!({
            "$defs": {
                "Tags": {
                    "description": "Free-form labels.",
                    "items": {"type": "string"},
                    "title": "Tags",
                    "type": "array"
                }
            },
            "properties": {"tags": {"$ref": "#/$defs/Tags"}},
            "required": ["tags"],
            "title": "Post",
            "type": "object"
        })
    );

    let (schema, model_name, _) = run(r#"
from pydantic import RootModel

class Ids(RootModel):
    root: List[int]
"#)?;
    assert_eq!(model_name, "Ids");
    assert_eq!(
        schema,
        json!({"items": {"type": "integer"}, "title": "Ids", "type": "array"})
    );

    let err = failure("from pydantic import RootModel\nclass Bad(RootModel[int]):\n    other: str\n");
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    Ok(())
}

#[test]
fn integers_wider_than_64_bits_are_exact() -> Result<()> {
    let (schema, _, _) = run(r#"
from pydantic import BaseModel, Field

class Ledger(BaseModel):
    total: int = Field(le=2**64)
    serial: int = 99999999999999999999999
"#)?;
    assert_eq!(
        schema.to_string(),
        concat!(
            r#"{"properties":{"total":{"maximum":18446744073709551616,"title":"Total","type":"integer"},"#,
            r#""serial":{"default":99999999999999999999999,"title":"Serial","type":"integer"}},"#,
            r#""required":["total"],"title":"Ledger","type":"object"}"#
        )
    );
    Ok(())
}

#[test]
fn decimal_precision_leaves_the_number_schema_alone() -> Result<()> {
    let (schema, _, _) = run(r#"
from decimal import Decimal
from pydantic import BaseModel, Field, condecimal

class Price(BaseModel):
    amount: Decimal = Field(max_digits=5, decimal_places=2)
    tax: condecimal(max_digits=4, decimal_places=1, ge=0)
"#)?;
    assert_eq!(
        schema,
        json!({
            "properties": {
                "amount": {
                    "anyOf": [{"type": "number"}, {"type": "string"}],
                    "title": "Amount"
                },
                "tax": {
                    "anyOf": [{"minimum": 0, "type": "number"}, {"type": "string"}],
                    "title": "Tax"
                }
            },
            "required": ["amount", "tax"],
            "title": "Price",
            "type": "object"
        })
    );
    Ok(())
}

#[test]
fn runtime_errors_are_execution_failures() {
    let err = failure("raise ValueError(\"boom\")\n");
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(err.to_string(), "Failed to execute Pydantic code: boom");

    let err = failure("class (:\n");
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert!(
        err.to_string()
            .starts_with("Failed to execute Pydantic code: ")
    );
}

#[test]
fn budgets_stop_execution() {
    let limits = LimitsConfig {
        max_steps: 5,
        ..LimitsConfig::default()
    };
    let source = "class A(BaseModel):\n    a: int\n    b: int\n    c: int\n    d: int\n";
    let err = match Pipeline::default().with_limits(limits).run(source) {
        Ok(_) => panic!("the step budget should have been exhausted"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(
        err.to_string(),
        "Failed to execute Pydantic code: execution budget exceeded: more than 5 interpreter steps"
    );

    let limits = LimitsConfig {
        max_source_bytes: 16,
        ..LimitsConfig::default()
    };
    let err = match Pipeline::default().with_limits(limits).run(source) {
        Ok(_) => panic!("the source is larger than the limit"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
}

#[test]
fn aliases_name_the_properties() -> Result<()> {
    let (schema, _, _) = run(r#"
class Profile(BaseModel):
    user_name: str = Field(alias="userName")
    bio: str = Field(default="", title="Biography")
"#)?;
    assert_eq!(
        schema,
        json!({
            "properties": {
                "userName": {"title": "Username", "type": "string"},
                "bio": {"default": "", "title": "Biography", "type": "string"}
            },
            "required": ["userName"],
            "title": "Profile",
            "type": "object"
        })
    );
    Ok(())
}
