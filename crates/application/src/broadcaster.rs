//! 业务事件广播
//!
//! 由其他后台模块（商家、评价、举报管理）调用，把事件推送给在线的
//! 管理员或商家所有者。事件不持久化，离线连接直接错过。

use std::sync::Arc;

use domain::{AdminEventKind, BusinessEventKind, BusinessId, ReviewEventKind, RoomKey};
use serde_json::Value;

use crate::outbound::ServerEvent;
use crate::registry::RoomRegistry;

#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<RoomRegistry>,
}

impl EventBroadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// 推送给 `admin` 房间的所有连接，返回送达数
    pub fn emit_admin_event(&self, kind: AdminEventKind, payload: Value) -> usize {
        let delivered = self
            .registry
            .deliver(&[RoomKey::Admin], ServerEvent::Admin { kind, payload }, None);
        tracing::debug!(kind = %kind, delivered, "admin event emitted");
        delivered
    }

    /// 推送给 `business:{id}` 房间
    pub fn emit_business_event(
        &self,
        business_id: BusinessId,
        kind: BusinessEventKind,
        payload: Value,
    ) -> usize {
        let delivered = self.registry.deliver(
            &[RoomKey::Business(business_id)],
            ServerEvent::Business {
                business_id,
                kind,
                payload,
            },
            None,
        );
        tracing::debug!(business_id = %business_id, kind = %kind, delivered, "business event emitted");
        delivered
    }

    /// 推送给商家房间和 `admin` 房间；同时在两个房间里的连接只收到一次
    ///
    /// 对象类型的载荷会补上 `businessId` 字段。
    pub fn emit_review_event(
        &self,
        business_id: BusinessId,
        kind: ReviewEventKind,
        payload: Value,
    ) -> usize {
        let payload = match payload {
            Value::Object(mut fields) => {
                fields.insert(
                    "businessId".to_string(),
                    Value::String(business_id.to_string()),
                );
                Value::Object(fields)
            }
            other => other,
        };

        let delivered = self.registry.deliver(
            &[RoomKey::Business(business_id), RoomKey::Admin],
            ServerEvent::Review {
                business_id,
                kind,
                payload,
            },
            None,
        );
        tracing::debug!(business_id = %business_id, kind = %kind, delivered, "review event emitted");
        delivered
    }
}
