//! The cycle-stepped simulation kernel.
//!
//! Every hardware unit implements [`SimComponent`] and is stepped once per
//! cycle by a [`SimRunner`]. Units talk through bounded [`SimSender`] /
//! [`SimReciver`] pairs built by one [`ChannelBuilder`]; a full channel is
//! how backpressure travels between units.
use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

pub trait SimComponent {
    type SharedStatus;
    /// update the component, return(busy, updated)
    ///
    /// - `busy`: the component still holds work
    /// - `updated`: the component made progress this cycle, or is waiting on a timed event
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool);
}

impl<Status> SimComponent for Box<dyn SimComponent<SharedStatus = Status>> {
    type SharedStatus = Status;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        self.as_mut().update(shared_status, current_cycle)
    }
}

impl<T, C> SimComponent for &mut T
where
    T: SimComponent<SharedStatus = C>,
{
    type SharedStatus = C;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        (*self).update(shared_status, current_cycle)
    }
}

impl<T, C> SimComponent for Vec<T>
where
    T: SimComponent<SharedStatus = C>,
{
    type SharedStatus = C;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        // every item must be updated, so don't short-circuit
        self.iter_mut()
            .map(|item| item.update(shared_status, current_cycle))
            .fold((false, false), |(busy, updated), (b, u)| {
                (busy || b, updated || u)
            })
    }
}

#[derive(Debug)]
pub struct SimRunner<T, S> {
    sim: T,
    shared_status: S,
    current_cycle: usize,
}
impl<T, S> SimRunner<T, S>
where
    T: SimComponent<SharedStatus = S>,
{
    pub fn new(sim: T, shared_status: S) -> SimRunner<T, S> {
        SimRunner {
            sim,
            current_cycle: 0,
            shared_status,
        }
    }
    pub fn get_sim(&self) -> &T {
        &self.sim
    }
    pub fn get_shared_status(&self) -> &S {
        &self.shared_status
    }
    pub fn get_sim_mut(&mut self) -> &mut T {
        &mut self.sim
    }
    pub fn get_shared_status_mut(&mut self) -> &mut S {
        &mut self.shared_status
    }
    /// step the simulation until it's not busy
    ///
    /// fails when the simulation is busy but nothing can make progress
    pub fn run(&mut self) -> eyre::Result<()> {
        loop {
            let result = self.sim.update(&mut self.shared_status, self.current_cycle);
            match result {
                (true, true) => {
                    self.current_cycle += 1;
                }
                (true, false) => {
                    tracing::error!(
                        "simulation is busy but not updated at cycle {}",
                        self.current_cycle
                    );
                    return Err(eyre::eyre!(
                        "simulation is busy but not updated at cycle {}",
                        self.current_cycle
                    ));
                }
                (false, _) => {
                    // not busy, so we are done
                    break;
                }
            }
        }
        Ok(())
    }
    pub fn get_current_cycle(&self) -> usize {
        self.current_cycle
    }
    pub fn into_inner(self) -> (T, S, usize) {
        (self.sim, self.shared_status, self.current_cycle)
    }
}

#[derive(Debug)]
pub struct SimSender<T> {
    buffer: Rc<RefCell<VecDeque<T>>>,
    max_size: usize,
    current_value_size: Rc<Cell<usize>>,
}
impl<T> Clone for SimSender<T> {
    fn clone(&self) -> SimSender<T> {
        SimSender {
            buffer: self.buffer.clone(),
            max_size: self.max_size,
            current_value_size: self.current_value_size.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SimReciver<T> {
    buffer: Rc<RefCell<VecDeque<T>>>,
    current_value_size: Rc<Cell<usize>>,
}
impl<T> Clone for SimReciver<T> {
    fn clone(&self) -> SimReciver<T> {
        SimReciver {
            buffer: self.buffer.clone(),
            current_value_size: self.current_value_size.clone(),
        }
    }
}

#[derive(Debug)]
pub struct InOutPort<T> {
    pub in_port: SimReciver<T>,
    pub out_port: SimSender<T>,
}
impl<T> Clone for InOutPort<T> {
    fn clone(&self) -> InOutPort<T> {
        InOutPort {
            in_port: self.in_port.clone(),
            out_port: self.out_port.clone(),
        }
    }
}

/// builds channels that share one counter of queued messages
#[derive(Debug, Clone, Default)]
pub struct ChannelBuilder {
    current_values: Rc<Cell<usize>>,
}
impl ChannelBuilder {
    pub fn new() -> ChannelBuilder {
        ChannelBuilder {
            current_values: Rc::new(Cell::new(0)),
        }
    }
    pub fn sim_channel<T>(&self, queue_len: usize) -> (SimSender<T>, SimReciver<T>) {
        let buffer = Rc::new(RefCell::new(VecDeque::with_capacity(queue_len)));
        (
            SimSender::<T> {
                buffer: buffer.clone(),
                max_size: queue_len,
                current_value_size: self.current_values.clone(),
            },
            SimReciver::<T> {
                buffer,
                current_value_size: self.current_values.clone(),
            },
        )
    }
    pub fn sim_channel_array<T>(
        &self,
        queue_len: usize,
        num_queues: usize,
    ) -> (Vec<SimSender<T>>, Vec<SimReciver<T>>) {
        (0..num_queues)
            .map(|_| self.sim_channel::<T>(queue_len))
            .unzip()
    }

    /// build a pair of ports connected to each other
    pub fn in_out_port<T>(&self, queue_len: usize) -> (InOutPort<T>, InOutPort<T>) {
        let (sender1, receiver1) = self.sim_channel::<T>(queue_len);
        let (sender2, receiver2) = self.sim_channel::<T>(queue_len);
        (
            InOutPort {
                in_port: receiver1,
                out_port: sender2,
            },
            InOutPort {
                in_port: receiver2,
                out_port: sender1,
            },
        )
    }
    pub fn in_out_port_array<T>(
        &self,
        queue_len: usize,
        num_queues: usize,
    ) -> (Vec<InOutPort<T>>, Vec<InOutPort<T>>) {
        (0..num_queues)
            .map(|_| self.in_out_port(queue_len))
            .unzip()
    }

    /// messages currently queued in all channels of this builder
    pub fn get_current_queue_size(&self) -> usize {
        self.current_values.get()
    }
}

impl<T> SimSender<T> {
    pub fn have_space(&self) -> bool {
        self.buffer.borrow().len() < self.max_size
    }
    /// push the data, give it back if the channel is full
    pub fn send(&self, data: T) -> Result<(), T> {
        let mut buffer = self.buffer.borrow_mut();
        if buffer.len() >= self.max_size {
            return Err(data);
        }
        buffer.push_back(data);
        self.current_value_size.set(self.current_value_size.get() + 1);
        Ok(())
    }
}
impl<T> SimReciver<T> {
    pub fn recv(&self) -> Option<T> {
        let data = self.buffer.borrow_mut().pop_front()?;
        self.current_value_size.set(self.current_value_size.get() - 1);
        Some(data)
    }
    /// put the data back to the head of the queue, used when the consumer cannot take it now
    pub fn ret(&self, data: T) {
        self.current_value_size.set(self.current_value_size.get() + 1);
        self.buffer.borrow_mut().push_front(data);
    }
    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }
    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }
}
impl_for_tuples_with_type!(SimComponent;update;SharedStatus;
    (A),
    (A,B),
    (A,B,C),
    (A,B,C,D),
    (A,B,C,D,E),
    (A,B,C,D,E,F),
    (A,B,C,D,E,F,G),
    (A,B,C,D,E,F,G,H),);
