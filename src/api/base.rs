use super::global_slot_chain;
use crate::base::{
    EntryContext, EntryStrongPtr, ParamsList, ParamsMap, ResourceType, ResourceWrapper,
    WardenEntry, WardenInput, SlotChain, TokenResult, TrafficType,
};
use crate::utils::format_time_nanos_curr;
use crate::{Error, Result};
use std::sync::Arc;

cfg_async! {
    use std::sync::RwLock;
}
cfg_not_async! {
    use std::cell::RefCell;
    use std::rc::Rc;
}

// EntryBuilder is the basic API of Warden.
pub struct EntryBuilder {
    resource_name: String,
    resource_type: ResourceType,
    traffic_type: TrafficType,
    batch_count: u32,
    flag: i32,
    slot_chain: Arc<SlotChain>,
    args: Option<ParamsList>,
    attachments: Option<ParamsMap>,
}

// or set all items in builder to None by default?
// then use builder to change `Default` ctx and initialize Entry seems better
impl Default for EntryBuilder {
    fn default() -> Self {
        EntryBuilder {
            resource_name: format_time_nanos_curr(),
            resource_type: ResourceType::default(),
            traffic_type: TrafficType::default(),
            batch_count: 1,
            flag: 0,
            slot_chain: global_slot_chain(),
            args: None,
            attachments: None,
        }
    }
}

impl EntryBuilder {
    pub fn new(resource_name: String) -> Self {
        EntryBuilder {
            resource_name,
            ..EntryBuilder::default()
        }
    }

    /// `build()` would consume EntryBuilder
    pub fn build(self) -> Result<EntryStrongPtr> {
        // get context from pool.
        let mut ctx = EntryContext::new();

        ctx.set_resource(ResourceWrapper::new(
            self.resource_name,
            self.resource_type,
            self.traffic_type,
        ));

        let mut input = WardenInput::new(self.batch_count, self.flag);
        if let Some(args) = self.args {
            input.set_args(args);
        }
        if let Some(attachments) = self.attachments {
            input.set_attachments(attachments);
        }
        ctx.set_input(input);

        cfg_if_async!(
            let ctx = Arc::new(RwLock::new(ctx)),
            let ctx = Rc::new(RefCell::new(ctx))
        );
        cfg_if_async!(
            let entry = Arc::new(RwLock::new(WardenEntry::new(
                ctx.clone(),
                Arc::clone(&self.slot_chain),
            ))),
            let entry = Rc::new(RefCell::new(WardenEntry::new(
                ctx.clone(),
                Arc::clone(&self.slot_chain),
            )))
        );
        cfg_if_async!(
            ctx.write().unwrap().set_entry(Arc::downgrade(&entry)),
            ctx.borrow_mut().set_entry(Rc::downgrade(&entry))
        );

        let r = self.slot_chain.entry(ctx.clone());
        match r {
            TokenResult::Blocked(_) => {
                // todo:
                // if return block_error,
                // must deep copy the error, since Arc only clone pointer
                cfg_if_async!(entry.read().unwrap().exit(), entry.borrow().exit());
                Err(Error::msg(r.to_string()))
            }
            _ => Ok(EntryStrongPtr::new(entry)),
        }
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    pub fn with_traffic_type(mut self, traffic_type: TrafficType) -> Self {
        self.traffic_type = traffic_type;
        self
    }

    pub fn with_batch_count(mut self, batch_count: u32) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_flag(mut self, flag: i32) -> Self {
        self.flag = flag;
        self
    }

    pub fn with_slot_chain(mut self, slot_chain: Arc<SlotChain>) -> Self {
        self.slot_chain = slot_chain;
        self
    }

    pub fn with_args(mut self, args: Option<ParamsList>) -> Self {
        self.args = args;
        self
    }

    pub fn with_attachments(mut self, attachments: Option<ParamsMap>) -> Self {
        self.attachments = attachments;
        self
    }
}

pub fn trace_error(entry: &EntryStrongPtr, err: Error) {
    entry.set_err(err);
}
