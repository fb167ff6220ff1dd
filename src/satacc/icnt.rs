use std::collections::BTreeMap;

use crate::{
    config::IcntType,
    sim::{ChannelBuilder, InOutPort, SimComponent},
};

use super::{statistics::IcntStat, waiting_task::WaitingTask, SataccStatus};

pub trait IcntMessage {
    fn get_target_port(&self) -> usize;
}

#[derive(Debug)]
pub struct IcntMsgWrapper<T> {
    pub msg: T,
    pub mem_target_port: usize,
}
impl<T> IcntMessage for IcntMsgWrapper<T> {
    fn get_target_port(&self) -> usize {
        self.mem_target_port
    }
}

/// which of the three interconnects, selects the statistics slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcntId {
    Mem,
    WatcherToClause,
    WatcherToWriter,
}

#[derive(Debug)]
struct InTransit<T> {
    message: T,
    source: usize,
    injected: usize,
}

/// A topology-aware interconnect.
///
/// Each directed link carries one message per cycle, a message that finds
/// its link taken waits for it. Every input port injects at most one
/// message per cycle and keeps at most `channel_size` messages in flight.
#[derive(Debug)]
pub struct SimpleIcnt<T> {
    pub ports: Vec<InOutPort<T>>,
    in_transit_messages: WaitingTask<InTransit<T>>,
    topology: IcntType,
    row_size: usize,
    link_free_cycle: BTreeMap<(usize, usize), usize>,
    in_flight: Vec<usize>,
    channel_size: usize,
    icnt_id: IcntId,
}

impl<T> SimpleIcnt<T> {
    pub fn new(
        ports: Vec<InOutPort<T>>,
        topology: IcntType,
        channel_size: usize,
        icnt_id: IcntId,
    ) -> Self {
        let num_ports = ports.len();
        let row_size = ((num_ports as f64).sqrt().floor() as usize).max(1);
        SimpleIcnt {
            in_flight: vec![0; num_ports],
            ports,
            in_transit_messages: WaitingTask::new(),
            topology,
            row_size,
            link_free_cycle: BTreeMap::new(),
            channel_size,
            icnt_id,
        }
    }

    /// build the icnt and the ports the other units use to talk to it
    pub fn new_with_config(
        n_ports: usize,
        channel_size: usize,
        topology: IcntType,
        icnt_id: IcntId,
        channel_builder: &ChannelBuilder,
    ) -> (Self, Vec<InOutPort<T>>) {
        let (icnt_ports, base_ports) = channel_builder.in_out_port_array(channel_size, n_ports);
        (
            SimpleIcnt::new(icnt_ports, topology, channel_size, icnt_id),
            base_ports,
        )
    }

    /// the directed links a message crosses from `from` to `to`
    fn route(&self, from: usize, to: usize) -> Vec<(usize, usize)> {
        let mut links = vec![];
        match self.topology {
            IcntType::Ideal => {}
            IcntType::Mesh => {
                // x first, then y
                let row_size = self.row_size;
                let (mut row, mut col) = (from / row_size, from % row_size);
                let (to_row, to_col) = (to / row_size, to % row_size);
                while col != to_col {
                    let next_col = if col < to_col { col + 1 } else { col - 1 };
                    links.push((row * row_size + col, row * row_size + next_col));
                    col = next_col;
                }
                while row != to_row {
                    let next_row = if row < to_row { row + 1 } else { row - 1 };
                    links.push((row * row_size + col, next_row * row_size + col));
                    row = next_row;
                }
            }
            IcntType::Ring => {
                let n = self.ports.len();
                let clockwise = (to + n - from) % n;
                let mut node = from;
                if clockwise <= n - clockwise {
                    for _ in 0..clockwise {
                        let next = (node + 1) % n;
                        links.push((node, next));
                        node = next;
                    }
                } else {
                    for _ in 0..n - clockwise {
                        let next = (node + n - 1) % n;
                        links.push((node, next));
                        node = next;
                    }
                }
            }
        }
        links
    }

    /// reserve every link of the route, return the arrival cycle
    fn reserve(&mut self, links: &[(usize, usize)], current_cycle: usize) -> usize {
        let mut cycle = current_cycle;
        for link in links {
            let free = self.link_free_cycle.entry(*link).or_insert(0);
            cycle = cycle.max(*free) + 1;
            *free = cycle;
        }
        cycle
    }
}

fn icnt_stat(shared_status: &mut SataccStatus, icnt_id: IcntId) -> &mut IcntStat {
    let stat = &mut shared_status.statistics.icnt_statistics;
    match icnt_id {
        IcntId::Mem => &mut stat.mem,
        IcntId::WatcherToClause => &mut stat.watcher_to_clause,
        IcntId::WatcherToWriter => &mut stat.watcher_to_writer,
    }
}

impl<T> SimComponent for SimpleIcnt<T>
where
    T: IcntMessage,
{
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut updated = false;

        // from input to icnt transit, ports are served in ascending order
        for source in 0..self.ports.len() {
            if self.in_flight[source] >= self.channel_size {
                continue;
            }
            let Some(message) = self.ports[source].in_port.recv() else {
                continue;
            };
            let target = message.get_target_port();
            let links = self.route(source, target);
            let arrive = self.reserve(&links, current_cycle);
            let stat = icnt_stat(shared_status, self.icnt_id);
            stat.total_messages += 1;
            stat.total_hops += links.len();
            self.in_flight[source] += 1;
            self.in_transit_messages.push(
                InTransit {
                    message,
                    source,
                    injected: current_cycle,
                },
                arrive,
            );
            updated = true;
        }

        // from icnt to output
        let mut blocked = vec![];
        while let Some((leaving_cycle, in_transit)) =
            self.in_transit_messages.pop_ready(current_cycle)
        {
            let InTransit {
                message,
                source,
                injected,
            } = in_transit;
            let output_port = message.get_target_port();
            match self.ports[output_port].out_port.send(message) {
                Ok(()) => {
                    self.in_flight[source] -= 1;
                    icnt_stat(shared_status, self.icnt_id)
                        .average_latency
                        .add(current_cycle - injected);
                    updated = true;
                }
                Err(message) => {
                    blocked.push((
                        leaving_cycle,
                        InTransit {
                            message,
                            source,
                            injected,
                        },
                    ));
                }
            }
        }
        // keep the delivery order for the next cycle
        for (leaving_cycle, in_transit) in blocked.into_iter().rev() {
            self.in_transit_messages.restore(in_transit, leaving_cycle);
        }

        let busy = !self.in_transit_messages.is_empty()
            || self.ports.iter().any(|port| !port.in_port.is_empty());
        let stat = icnt_stat(shared_status, self.icnt_id);
        if busy || updated {
            stat.busy_cycle += 1;
        } else {
            stat.idle_cycle += 1;
        }
        updated |= self.in_transit_messages.any_leaving_after(current_cycle);
        (busy, updated)
    }
}

#[cfg(test)]
mod icnt_test {

    use super::*;
    use crate::test_utils;

    #[derive(Debug)]
    struct TestMessage {
        output_id: usize,
    }
    impl IcntMessage for TestMessage {
        fn get_target_port(&self) -> usize {
            self.output_id
        }
    }

    fn build(
        n_ports: usize,
        topology: IcntType,
        channel_size: usize,
    ) -> (SimpleIcnt<TestMessage>, Vec<InOutPort<TestMessage>>) {
        let channel_builder = ChannelBuilder::new();
        SimpleIcnt::new_with_config(
            n_ports,
            channel_size,
            topology,
            IcntId::Mem,
            &channel_builder,
        )
    }

    /// the cycle the message from `from` to `to` shows up at `to`
    fn arrival_cycle(n_ports: usize, topology: IcntType, from: usize, to: usize) -> usize {
        let (mut icnt, base_port) = build(n_ports, topology, 10);
        base_port[from]
            .out_port
            .send(TestMessage { output_id: to })
            .unwrap();
        let mut status = SataccStatus::default();
        let mut current_cycle = 0;
        loop {
            icnt.update(&mut status, current_cycle);
            if base_port[to].in_port.recv().is_some() {
                return current_cycle;
            }
            current_cycle += 1;
        }
    }

    #[test]
    fn icnt_test() {
        test_utils::init();
        // 9 nodes form a 3x3 mesh, 0 -> 8 is 2 steps in x and 2 in y
        assert_eq!(arrival_cycle(9, IcntType::Mesh, 0, 8), 4);
        assert_eq!(arrival_cycle(9, IcntType::Mesh, 4, 4), 0);
        // the ring takes the short way around
        assert_eq!(arrival_cycle(8, IcntType::Ring, 0, 7), 1);
        assert_eq!(arrival_cycle(8, IcntType::Ring, 1, 4), 3);
        assert_eq!(arrival_cycle(9, IcntType::Ideal, 0, 8), 0);
    }

    #[test]
    fn ring_tie_goes_clockwise() {
        let (icnt, _ports) = build(4, IcntType::Ring, 10);
        assert_eq!(icnt.route(0, 2), vec![(0, 1), (1, 2)]);
        assert_eq!(icnt.route(3, 1), vec![(3, 0), (0, 1)]);
    }

    #[test]
    fn mesh_routes_x_then_y() {
        let (icnt, _ports) = build(9, IcntType::Mesh, 10);
        assert_eq!(icnt.route(0, 4), vec![(0, 1), (1, 4)]);
        assert_eq!(icnt.route(8, 0), vec![(8, 7), (7, 6), (6, 3), (3, 0)]);
    }

    #[test]
    fn shared_link_adds_queuing_delay() {
        let (mut icnt, base_port) = build(4, IcntType::Ring, 10);
        // both messages need the link 1 -> 2 in the same cycle
        base_port[0]
            .out_port
            .send(TestMessage { output_id: 2 })
            .unwrap();
        base_port[1]
            .out_port
            .send(TestMessage { output_id: 2 })
            .unwrap();
        let mut status = SataccStatus::default();
        let mut arrivals = vec![];
        for cycle in 0..10 {
            icnt.update(&mut status, cycle);
            while base_port[2].in_port.recv().is_some() {
                arrivals.push(cycle);
            }
        }
        // 0 -> 1 -> 2 takes 2 cycles, 1 -> 2 waits for the first to pass
        assert_eq!(arrivals, vec![2, 3]);
        let stat = &status.statistics.icnt_statistics.mem;
        assert_eq!(stat.total_messages, 2);
        assert_eq!(stat.total_hops, 3);
    }

    #[test]
    fn full_output_holds_messages() {
        let (mut icnt, base_port) = build(2, IcntType::Ideal, 1);
        let mut status = SataccStatus::default();
        base_port[0]
            .out_port
            .send(TestMessage { output_id: 1 })
            .unwrap();
        assert_eq!(icnt.update(&mut status, 0), (false, true));
        base_port[0]
            .out_port
            .send(TestMessage { output_id: 1 })
            .unwrap();
        // the output channel of port 1 holds one message, the second waits
        assert_eq!(icnt.update(&mut status, 1), (true, true));
        assert_eq!(icnt.update(&mut status, 2), (true, false));
        assert!(base_port[1].in_port.recv().is_some());
        assert_eq!(icnt.update(&mut status, 3), (false, true));
        assert!(base_port[1].in_port.recv().is_some());
        assert!(base_port[1].in_port.recv().is_none());
    }
}
