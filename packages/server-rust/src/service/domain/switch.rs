//! Switch bank members addressed by `Id`.
//!
//! Switch definitions live under the device's `switches` mapping, keyed by
//! the id as a string. Live values and renamed switches are kept in the same
//! mapping in state, which starts as a copy of the configured one.

use alpaca_sim_core::{property_map, AlpacaError, PropertyMap, PropertyMapExt, Value};
use tracing::debug;

use super::DeviceContext;
use crate::service::operation::OperationResponse;

const SWITCHES: &str = "switches";

/// Per-switch `GET` members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchQuery {
    CanAsync,
    CanWrite,
    State,
    Value,
    Name,
    Description,
    Minimum,
    Maximum,
    Step,
    StateChangeComplete,
}

impl SwitchQuery {
    #[must_use]
    pub fn from_member(member: &str) -> Option<Self> {
        Some(match member {
            "canasync" => Self::CanAsync,
            "canwrite" => Self::CanWrite,
            "getswitch" => Self::State,
            "getswitchvalue" => Self::Value,
            "getswitchname" => Self::Name,
            "getswitchdescription" => Self::Description,
            "minswitchvalue" => Self::Minimum,
            "maxswitchvalue" => Self::Maximum,
            "switchstep" => Self::Step,
            "statechangecomplete" => Self::StateChangeComplete,
            _ => return None,
        })
    }

    #[must_use]
    pub fn member(self) -> &'static str {
        match self {
            Self::CanAsync => "canasync",
            Self::CanWrite => "canwrite",
            Self::State => "getswitch",
            Self::Value => "getswitchvalue",
            Self::Name => "getswitchname",
            Self::Description => "getswitchdescription",
            Self::Minimum => "minswitchvalue",
            Self::Maximum => "maxswitchvalue",
            Self::Step => "switchstep",
            Self::StateChangeComplete => "statechangecomplete",
        }
    }
}

/// Per-switch `PUT` members.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchChange {
    State { state: bool, asynchronous: bool },
    Value { value: f64, asynchronous: bool },
    Name(String),
}

impl SwitchChange {
    #[must_use]
    pub fn member(&self) -> &'static str {
        match self {
            Self::State {
                asynchronous: false,
                ..
            } => "setswitch",
            Self::State { .. } => "setasync",
            Self::Value {
                asynchronous: false,
                ..
            } => "setswitchvalue",
            Self::Value { .. } => "setasyncvalue",
            Self::Name(_) => "setswitchname",
        }
    }
}

/// Resolved configuration of one switch.
struct Definition {
    key: String,
    fields: PropertyMap,
}

impl Definition {
    fn lookup(ctx: &DeviceContext<'_>, id: i64) -> Result<Self, AlpacaError> {
        let key = id.to_string();
        match bank(&ctx.config).get(&key) {
            Some(Value::Map(fields)) => Ok(Self {
                key,
                fields: fields.clone(),
            }),
            Some(_) => Ok(Self {
                key,
                fields: PropertyMap::new(),
            }),
            None => Err(AlpacaError::invalid_value(format!("Invalid switch ID: {id}"))),
        }
    }

    fn can_write(&self) -> bool {
        self.fields.bool_or("canwrite", true)
    }

    fn can_async(&self) -> bool {
        self.fields.bool_or("canasync", false)
    }

    fn minimum(&self) -> f64 {
        self.fields.f64_or("minimum", 0.0)
    }

    fn maximum(&self) -> f64 {
        self.fields.f64_or("maximum", 1.0)
    }

    /// A live field from state, else the configured one.
    fn current(&self, state: &PropertyMap, field: &str) -> Option<Value> {
        let live = match bank(state).get(&self.key) {
            Some(Value::Map(live)) => live.get(field).cloned(),
            _ => None,
        };
        live.or_else(|| self.fields.get(field).cloned())
    }

    fn value(&self, state: &PropertyMap) -> f64 {
        self.current(state, "value")
            .as_ref()
            .and_then(numeric)
            .unwrap_or(0.0)
    }
}

fn bank(map: &PropertyMap) -> &PropertyMap {
    static EMPTY: PropertyMap = PropertyMap::new();
    match map.get(SWITCHES) {
        Some(Value::Map(switches)) => switches,
        _ => &EMPTY,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_bool().map(|on| if on { 1.0 } else { 0.0 }))
}

/// `GET maxswitch`: the configured count, else the number of defined switches.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn max_switch(ctx: &DeviceContext<'_>) -> OperationResponse {
    let count = bank(&ctx.config).len() as i64;
    OperationResponse::Value(ctx.config.i64_or("maxswitch", count).into())
}

/// # Errors
///
/// `InvalidValue` when `id` names no configured switch.
pub fn query(
    ctx: &DeviceContext<'_>,
    id: i64,
    member: SwitchQuery,
) -> Result<OperationResponse, AlpacaError> {
    let definition = Definition::lookup(ctx, id)?;
    let state = ctx.store.get(ctx.id);

    let value: Value = match member {
        SwitchQuery::CanAsync => definition.can_async().into(),
        SwitchQuery::CanWrite => definition.can_write().into(),
        SwitchQuery::State => (definition.value(&state) != 0.0).into(),
        SwitchQuery::Value => definition.value(&state).into(),
        SwitchQuery::Name => definition
            .current(&state, "name")
            .and_then(|name| name.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("Switch {id}"))
            .into(),
        SwitchQuery::Description => definition.fields.str_or("description", "").into(),
        SwitchQuery::Minimum => definition.minimum().into(),
        SwitchQuery::Maximum => definition.maximum().into(),
        SwitchQuery::Step => definition.fields.f64_or("step", 1.0).into(),
        SwitchQuery::StateChangeComplete => true.into(),
    };
    Ok(OperationResponse::Value(value))
}

/// Applies a write to one switch. Asynchronous writes complete immediately.
///
/// # Errors
///
/// `InvalidValue` for an unknown id or a value outside `[minimum, maximum]`;
/// `NotImplemented` when the switch is read-only or the write is
/// asynchronous and the switch cannot do that.
pub fn change(
    ctx: &DeviceContext<'_>,
    id: i64,
    request: &SwitchChange,
) -> Result<OperationResponse, AlpacaError> {
    let definition = Definition::lookup(ctx, id)?;

    let fields = match request {
        SwitchChange::Name(name) => property_map([("name", name.as_str().into())]),
        SwitchChange::State {
            state,
            asynchronous,
        } => {
            check_writable(&definition, id, *asynchronous)?;
            let value = if *state {
                definition.maximum()
            } else {
                definition.minimum()
            };
            property_map([("value", value.into())])
        }
        SwitchChange::Value {
            value,
            asynchronous,
        } => {
            check_writable(&definition, id, *asynchronous)?;
            let (min, max) = (definition.minimum(), definition.maximum());
            if !(min..=max).contains(value) {
                return Err(AlpacaError::invalid_value(format!(
                    "Value {value} out of range ({min}-{max})"
                )));
            }
            property_map([("value", (*value).into())])
        }
    };

    ctx.store.update_with(ctx.id, |state| {
        let mut switches = bank(state).clone();
        let entry = switches
            .entry(definition.key.clone())
            .or_insert_with(|| Value::Map(PropertyMap::new()));
        match entry {
            Value::Map(live) => live.extend(fields),
            other => *other = Value::Map(fields),
        }
        (property_map([(SWITCHES, Value::Map(switches))]), ())
    });
    debug!(device = %ctx.id, switch = id, member = request.member(), "switch changed");
    Ok(OperationResponse::Empty)
}

fn check_writable(definition: &Definition, id: i64, asynchronous: bool) -> Result<(), AlpacaError> {
    if !definition.can_write() {
        return Err(AlpacaError::not_implemented(format!(
            "Switch {id} is read-only"
        )));
    }
    if asynchronous && !definition.can_async() {
        return Err(AlpacaError::not_implemented(format!(
            "Switch {id} does not support async operation"
        )));
    }
    Ok(())
}
