//! Contract ABI definitions and JSON <-> binary action data conversion.
//!
//! # Type grammar
//! - `T[]` array, varuint32 length prefix
//! - `T?` optional, one flag byte
//! - `T$` binary extension, may be absent at the end of a struct
//! - typedefs, structs (with `base`) and variants resolve through the ABI

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::chain::builtins;
use crate::chain::serializer::{ByteReader, ByteWriter, CodecError};

const MAX_DEPTH: usize = 64;

/// Errors raised while encoding or decoding against an ABI.
#[derive(Debug, Clone, Error)]
pub enum AbiError {
    #[error("ABI does not define action '{0}'")]
    UnknownAction(String),

    #[error("unknown ABI type '{0}'")]
    UnknownType(String),

    #[error("invalid value for '{ty}': {detail}")]
    TypeMismatch { ty: String, detail: String },

    #[error("missing field '{field}' of struct '{structure}'")]
    MissingField { structure: String, field: String },

    #[error("type nesting is too deep")]
    TooDeep,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiTypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiStruct {
    pub name: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<AbiField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiAction {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub ricardian_contract: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiVariant {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// ABI document as returned by `/v1/chain/get_abi`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AbiDef {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<AbiTypeDef>,
    #[serde(default)]
    pub structs: Vec<AbiStruct>,
    #[serde(default)]
    pub actions: Vec<AbiAction>,
    #[serde(default)]
    pub variants: Vec<AbiVariant>,
}

/// An ABI indexed for encoding and decoding.
#[derive(Debug, Clone)]
pub struct Abi {
    typedefs: HashMap<String, String>,
    structs: HashMap<String, AbiStruct>,
    variants: HashMap<String, AbiVariant>,
    actions: HashMap<String, String>,
}

impl Abi {
    pub fn new(def: AbiDef) -> Self {
        Self {
            typedefs: def
                .types
                .into_iter()
                .map(|t| (t.new_type_name, t.type_name))
                .collect(),
            structs: def.structs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            variants: def.variants.into_iter().map(|v| (v.name.clone(), v)).collect(),
            actions: def
                .actions
                .into_iter()
                .map(|a| (a.name, a.type_name))
                .collect(),
        }
    }

    /// The struct type carrying an action's data.
    pub fn action_type(&self, action: &str) -> Option<&str> {
        self.actions.get(action).map(String::as_str)
    }

    pub fn encode_action_data(&self, action: &str, data: &Value) -> Result<Vec<u8>, AbiError> {
        let ty = self
            .action_type(action)
            .ok_or_else(|| AbiError::UnknownAction(action.to_string()))?;
        let mut w = ByteWriter::new();
        self.encode(ty, data, &mut w)?;
        Ok(w.into_bytes())
    }

    pub fn decode_action_data(&self, action: &str, data: &[u8]) -> Result<Value, AbiError> {
        let ty = self
            .action_type(action)
            .ok_or_else(|| AbiError::UnknownAction(action.to_string()))?;
        let mut r = ByteReader::new(data);
        let value = self.decode(ty, &mut r)?;
        r.finish()?;
        Ok(value)
    }

    pub fn encode(&self, ty: &str, value: &Value, w: &mut ByteWriter) -> Result<(), AbiError> {
        self.encode_at(ty, value, w, 0)
    }

    pub fn decode(&self, ty: &str, r: &mut ByteReader<'_>) -> Result<Value, AbiError> {
        self.decode_at(ty, r, 0)
    }

    fn resolve<'t>(&'t self, mut ty: &'t str) -> Result<&'t str, AbiError> {
        for _ in 0..MAX_DEPTH {
            match self.typedefs.get(ty) {
                Some(target) => ty = target,
                None => return Ok(ty),
            }
        }
        Err(AbiError::TooDeep)
    }

    fn encode_at(&self, ty: &str, value: &Value, w: &mut ByteWriter, depth: usize) -> Result<(), AbiError> {
        if depth > MAX_DEPTH {
            return Err(AbiError::TooDeep);
        }
        let ty = self.resolve(ty)?;

        if let Some(inner) = ty.strip_suffix('$') {
            return self.encode_at(inner, value, w, depth + 1);
        }
        if let Some(inner) = ty.strip_suffix('?') {
            if value.is_null() {
                w.write_u8(0);
                return Ok(());
            }
            w.write_u8(1);
            return self.encode_at(inner, value, w, depth + 1);
        }
        if let Some(inner) = ty.strip_suffix("[]") {
            let items = value.as_array().ok_or_else(|| AbiError::TypeMismatch {
                ty: ty.to_string(),
                detail: format!("expected an array, got {}", value),
            })?;
            w.write_varuint32(items.len() as u32);
            for item in items {
                self.encode_at(inner, item, w, depth + 1)?;
            }
            return Ok(());
        }
        if builtins::is_builtin(ty) {
            return builtins::encode(ty, value, w);
        }
        if let Some(structure) = self.structs.get(ty) {
            return self.encode_struct(structure, value, w, depth);
        }
        if let Some(variant) = self.variants.get(ty) {
            return self.encode_variant(variant, value, w, depth);
        }
        Err(AbiError::UnknownType(ty.to_string()))
    }

    fn encode_struct(&self, structure: &AbiStruct, value: &Value, w: &mut ByteWriter, depth: usize) -> Result<(), AbiError> {
        let object = value.as_object().ok_or_else(|| AbiError::TypeMismatch {
            ty: structure.name.clone(),
            detail: format!("expected an object, got {}", value),
        })?;

        if !structure.base.is_empty() {
            self.encode_at(&structure.base, value, w, depth + 1)?;
        }

        for field in &structure.fields {
            match object.get(&field.name) {
                Some(field_value) => self.encode_at(&field.type_name, field_value, w, depth + 1)?,
                // Trailing extensions may be omitted; everything after must be too.
                None if field.type_name.ends_with('$') => break,
                None if field.type_name.ends_with('?') => w.write_u8(0),
                None => {
                    return Err(AbiError::MissingField {
                        structure: structure.name.clone(),
                        field: field.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    fn encode_variant(&self, variant: &AbiVariant, value: &Value, w: &mut ByteWriter, depth: usize) -> Result<(), AbiError> {
        let mismatch = || AbiError::TypeMismatch {
            ty: variant.name.clone(),
            detail: format!("expected [\"type\", value], got {}", value),
        };
        let pair = value.as_array().filter(|a| a.len() == 2).ok_or_else(mismatch)?;
        let type_name = pair[0].as_str().ok_or_else(mismatch)?;
        let index = variant
            .types
            .iter()
            .position(|t| t == type_name)
            .ok_or_else(|| AbiError::TypeMismatch {
                ty: variant.name.clone(),
                detail: format!("'{}' is not one of {:?}", type_name, variant.types),
            })?;
        w.write_varuint32(index as u32);
        self.encode_at(type_name, &pair[1], w, depth + 1)
    }

    fn decode_at(&self, ty: &str, r: &mut ByteReader<'_>, depth: usize) -> Result<Value, AbiError> {
        if depth > MAX_DEPTH {
            return Err(AbiError::TooDeep);
        }
        let ty = self.resolve(ty)?;

        if let Some(inner) = ty.strip_suffix('$') {
            return self.decode_at(inner, r, depth + 1);
        }
        if let Some(inner) = ty.strip_suffix('?') {
            return match r.read_u8()? {
                0 => Ok(Value::Null),
                _ => self.decode_at(inner, r, depth + 1),
            };
        }
        if let Some(inner) = ty.strip_suffix("[]") {
            let len = r.read_varuint32()? as usize;
            let mut items = Vec::with_capacity(len.min(r.remaining()));
            for _ in 0..len {
                items.push(self.decode_at(inner, r, depth + 1)?);
            }
            return Ok(Value::Array(items));
        }
        if builtins::is_builtin(ty) {
            return builtins::decode(ty, r);
        }
        if let Some(structure) = self.structs.get(ty) {
            let mut object = Map::new();
            self.decode_struct(structure, r, &mut object, depth)?;
            return Ok(Value::Object(object));
        }
        if let Some(variant) = self.variants.get(ty) {
            let index = r.read_varuint32()? as usize;
            let type_name = variant.types.get(index).ok_or_else(|| AbiError::TypeMismatch {
                ty: variant.name.clone(),
                detail: format!("variant index {} out of range", index),
            })?;
            let inner = self.decode_at(type_name, r, depth + 1)?;
            return Ok(Value::Array(vec![Value::String(type_name.clone()), inner]));
        }
        Err(AbiError::UnknownType(ty.to_string()))
    }

    fn decode_struct(&self, structure: &AbiStruct, r: &mut ByteReader<'_>, object: &mut Map<String, Value>, depth: usize) -> Result<(), AbiError> {
        if !structure.base.is_empty() {
            let base_name = self.resolve(&structure.base)?;
            let base = self
                .structs
                .get(base_name)
                .ok_or_else(|| AbiError::UnknownType(base_name.to_string()))?;
            self.decode_struct(base, r, object, depth + 1)?;
        }
        for field in &structure.fields {
            if field.type_name.ends_with('$') && r.is_empty() {
                break;
            }
            let value = self.decode_at(&field.type_name, r, depth + 1)?;
            object.insert(field.name.clone(), value);
        }
        Ok(())
    }
}
