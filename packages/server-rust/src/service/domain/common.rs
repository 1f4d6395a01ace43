//! Members every device type supports.

use alpaca_sim_core::{property_map, DeviceIdentity, PropertyMap, PropertyMapExt, Value};
use tracing::debug;

use super::DeviceContext;
use crate::service::operation::{Operation, OperationResponse};

fn config_or(ctx: &DeviceContext<'_>, key: &str, fallback: impl FnOnce() -> String) -> Value {
    ctx.config
        .get(key)
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::String(fallback()))
}

/// Configured `name`, else one generated from the identity.
#[must_use]
pub fn device_name(config: &PropertyMap, id: DeviceIdentity) -> String {
    config.get("name").and_then(Value::as_str).map_or_else(
        || format!("Simulator {} #{}", id.device_type.display_name(), id.device_number),
        str::to_string,
    )
}

/// Handles a common member. Returns `None` for operations outside this family.
#[must_use]
pub fn handle(ctx: &DeviceContext<'_>, op: &Operation) -> Option<OperationResponse> {
    let type_name = ctx.id.device_type.display_name();
    let response = match op {
        Operation::GetConnected => {
            OperationResponse::Value(ctx.store.get(ctx.id).bool_or("connected", false).into())
        }
        Operation::SetConnected(connected) => set_connected(ctx, *connected),
        Operation::Connect => set_connected(ctx, true),
        Operation::Disconnect => set_connected(ctx, false),
        Operation::GetConnecting => OperationResponse::Value(false.into()),
        Operation::GetDescription => OperationResponse::Value(config_or(ctx, "description", || {
            format!("Simulated {type_name} Device")
        })),
        Operation::GetName => OperationResponse::Value(device_name(&ctx.config, ctx.id).into()),
        Operation::GetDriverInfo => {
            OperationResponse::Value(config_or(ctx, "driverinfo", String::new))
        }
        Operation::GetDriverVersion => {
            OperationResponse::Value(config_or(ctx, "driverversion", String::new))
        }
        Operation::GetInterfaceVersion => {
            OperationResponse::Value(ctx.config.i64_or("interfaceversion", 3).into())
        }
        Operation::GetSupportedActions => OperationResponse::Value(
            ctx.config
                .get("supportedactions")
                .cloned()
                .unwrap_or(Value::Array(Vec::new())),
        ),
        Operation::Action { action, parameters } => {
            debug!(device = %ctx.id, %action, %parameters, "custom action ignored");
            OperationResponse::Value(Value::from(""))
        }
        Operation::CommandBlind { command } => {
            debug!(device = %ctx.id, %command, "commandblind");
            OperationResponse::Empty
        }
        Operation::CommandBool { command } => {
            debug!(device = %ctx.id, %command, "commandbool");
            OperationResponse::Value(false.into())
        }
        Operation::CommandString { command } => {
            debug!(device = %ctx.id, %command, "commandstring");
            OperationResponse::Value(Value::from(""))
        }
        Operation::GetDeviceState => {
            let snapshot: PropertyMap = ctx.store.get(ctx.id);
            OperationResponse::Value(Value::Map(snapshot))
        }
        _ => return None,
    };
    Some(response)
}

fn set_connected(ctx: &DeviceContext<'_>, connected: bool) -> OperationResponse {
    ctx.store
        .update(ctx.id, property_map([("connected", connected.into())]));
    OperationResponse::Empty
}
