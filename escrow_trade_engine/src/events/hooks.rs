use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, MessageSentEvent, TradeStatusChangedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub trade_status_producer: Vec<EventProducer<TradeStatusChangedEvent>>,
    pub message_sent_producer: Vec<EventProducer<MessageSentEvent>>,
}

impl EventProducers {
    pub async fn publish_trade_status(&self, event: TradeStatusChangedEvent) {
        for producer in &self.trade_status_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_message_sent(&self, event: MessageSentEvent) {
        for producer in &self.message_sent_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_trade_status_changed: Option<EventHandler<TradeStatusChangedEvent>>,
    pub on_message_sent: Option<EventHandler<MessageSentEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_trade_status_changed = hooks.on_trade_status_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_message_sent = hooks.on_message_sent.map(|f| EventHandler::new(buffer_size, f));
        Self { on_trade_status_changed, on_message_sent }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_trade_status_changed {
            result.trade_status_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_message_sent {
            result.message_sent_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_trade_status_changed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_message_sent {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_trade_status_changed: Option<Handler<TradeStatusChangedEvent>>,
    pub on_message_sent: Option<Handler<MessageSentEvent>>,
}

impl EventHooks {
    pub fn on_trade_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TradeStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_trade_status_changed = Some(Arc::new(f));
        self
    }

    pub fn on_message_sent<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(MessageSentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_message_sent = Some(Arc::new(f));
        self
    }
}
