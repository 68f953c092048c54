//! Built-in ZynqMP-style board description
//!
//! Topology:
//! - FPD domain: APU island (APU_0..3), L2, SATA, GPU PP 0
//! - LPD domain: RPU island (RPU_0, RPU_1), OCM banks, TCM banks, USB,
//!   UARTs, TTC
//!
//! Masters are the APU cluster (addressed by the APU island id) and the two
//! RPU cores in split mode (addressed by their processor ids).

use super::{MasterDesc, MmioRegion, NodeDesc, NodeDescKind, TopologyConfig};
use crate::core::node::power::{PowerClass, PowerState};
use crate::core::node::proc::{ProcState, ResumePolicy};
use crate::core::node::slave::SlaveClass;
use crate::core::node::NodeId;
use crate::drivers::ipi::IpiChannel;

pub const NODE_APU: NodeId = NodeId(1);
pub const NODE_APU_0: NodeId = NodeId(2);
pub const NODE_APU_1: NodeId = NodeId(3);
pub const NODE_APU_2: NodeId = NodeId(4);
pub const NODE_APU_3: NodeId = NodeId(5);
pub const NODE_RPU: NodeId = NodeId(6);
pub const NODE_RPU_0: NodeId = NodeId(7);
pub const NODE_RPU_1: NodeId = NodeId(8);
pub const NODE_FPD: NodeId = NodeId(10);
pub const NODE_OCM_BANK_0: NodeId = NodeId(11);
pub const NODE_OCM_BANK_1: NodeId = NodeId(12);
pub const NODE_OCM_BANK_2: NodeId = NodeId(13);
pub const NODE_OCM_BANK_3: NodeId = NodeId(14);
pub const NODE_TCM_0_A: NodeId = NodeId(15);
pub const NODE_TCM_0_B: NodeId = NodeId(16);
pub const NODE_TCM_1_A: NodeId = NodeId(17);
pub const NODE_TCM_1_B: NodeId = NodeId(18);
pub const NODE_L2: NodeId = NodeId(19);
pub const NODE_GPU_PP_0: NodeId = NodeId(20);
pub const NODE_USB_0: NodeId = NodeId(22);
pub const NODE_TTC_0: NodeId = NodeId(24);
pub const NODE_SATA: NodeId = NodeId(28);
pub const NODE_UART_0: NodeId = NodeId(33);
pub const NODE_UART_1: NodeId = NodeId(34);
pub const NODE_LPD: NodeId = NodeId(62);

/// IPI channel masks of the masters
pub const IPI_APU: IpiChannel = IpiChannel(0x0000_0001);
pub const IPI_RPU_0: IpiChannel = IpiChannel(0x0000_0100);
pub const IPI_RPU_1: IpiChannel = IpiChannel(0x0000_0200);

/// Processor state power figures: forced down, active, suspended, suspending
const APU_POWER: [u32; 4] = [0, 300, 10, 300];
const RPU_POWER: [u32; 4] = [0, 150, 5, 150];

const fn apu(id: NodeId, initial: ProcState) -> NodeDesc {
    NodeDesc {
        id,
        parent: Some(NODE_APU),
        kind: NodeDescKind::Processor {
            master: NODE_APU,
            pwr_dn_latency: 100,
            pwr_up_latency: 200,
            resume: ResumePolicy::Any,
            power: APU_POWER,
            initial,
        },
    }
}

const fn rpu(id: NodeId) -> NodeDesc {
    NodeDesc {
        id,
        parent: Some(NODE_RPU),
        kind: NodeDescKind::Processor {
            master: id,
            pwr_dn_latency: 50,
            pwr_up_latency: 100,
            resume: ResumePolicy::Vectors,
            power: RPU_POWER,
            initial: ProcState::Active,
        },
    }
}

const fn power(id: NodeId, parent: Option<NodeId>, class: PowerClass, up_latency: u32) -> NodeDesc {
    NodeDesc {
        id,
        parent,
        kind: NodeDescKind::Power {
            class,
            up_latency,
            down_latency: up_latency / 2,
            power: [0, 50],
            initial: PowerState::On,
        },
    }
}

const fn slave(id: NodeId, parent: NodeId, class: SlaveClass, wake_irq: Option<u32>) -> NodeDesc {
    NodeDesc { id, parent: Some(parent), kind: NodeDescKind::Slave { class, wake_irq } }
}

static NODES: [NodeDesc; 25] = [
    power(NODE_FPD, None, PowerClass::Domain, 1000),
    power(NODE_LPD, None, PowerClass::Domain, 1000),
    power(NODE_APU, Some(NODE_FPD), PowerClass::Island, 300),
    power(NODE_RPU, Some(NODE_LPD), PowerClass::Island, 200),
    apu(NODE_APU_0, ProcState::Active),
    apu(NODE_APU_1, ProcState::ForcedDown),
    apu(NODE_APU_2, ProcState::ForcedDown),
    apu(NODE_APU_3, ProcState::ForcedDown),
    rpu(NODE_RPU_0),
    rpu(NODE_RPU_1),
    slave(NODE_L2, NODE_FPD, SlaveClass::Sram, None),
    slave(NODE_SATA, NODE_FPD, SlaveClass::Generic, Some(165)),
    slave(NODE_GPU_PP_0, NODE_FPD, SlaveClass::Generic, None),
    slave(NODE_OCM_BANK_0, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_OCM_BANK_1, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_OCM_BANK_2, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_OCM_BANK_3, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_TCM_0_A, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_TCM_0_B, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_TCM_1_A, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_TCM_1_B, NODE_LPD, SlaveClass::Sram, None),
    slave(NODE_USB_0, NODE_LPD, SlaveClass::Generic, Some(97)),
    slave(NODE_TTC_0, NODE_LPD, SlaveClass::Generic, Some(68)),
    slave(NODE_UART_0, NODE_LPD, SlaveClass::Generic, Some(53)),
    slave(NODE_UART_1, NODE_LPD, SlaveClass::Generic, Some(54)),
];

static MASTERS: [MasterDesc; 3] = [
    MasterDesc {
        id: NODE_APU,
        channel: IPI_APU,
        procs: &[NODE_APU_0, NODE_APU_1, NODE_APU_2, NODE_APU_3],
        may_suspend: &[NODE_RPU_0, NODE_RPU_1],
        system_privileged: true,
        slaves: &[
            NODE_L2,
            NODE_SATA,
            NODE_GPU_PP_0,
            NODE_OCM_BANK_0,
            NODE_OCM_BANK_1,
            NODE_OCM_BANK_2,
            NODE_OCM_BANK_3,
            NODE_USB_0,
            NODE_TTC_0,
            NODE_UART_0,
            NODE_UART_1,
        ],
    },
    MasterDesc {
        id: NODE_RPU_0,
        channel: IPI_RPU_0,
        procs: &[NODE_RPU_0],
        may_suspend: &[NODE_APU],
        system_privileged: false,
        slaves: &[
            NODE_OCM_BANK_0,
            NODE_TCM_0_A,
            NODE_TCM_0_B,
            NODE_USB_0,
            NODE_TTC_0,
            NODE_UART_0,
            NODE_UART_1,
        ],
    },
    MasterDesc {
        id: NODE_RPU_1,
        channel: IPI_RPU_1,
        procs: &[NODE_RPU_1],
        may_suspend: &[],
        system_privileged: false,
        slaves: &[NODE_OCM_BANK_1, NODE_TCM_1_A, NODE_TCM_1_B, NODE_TTC_0, NODE_UART_1],
    },
];

static MMIO: [MmioRegion; 3] = [
    // CRF_APB
    MmioRegion { base: 0xFD1A_0000, size: 0x1000, masters: &[NODE_APU] },
    // CRL_APB
    MmioRegion { base: 0xFF5E_0000, size: 0x1000, masters: &[NODE_APU, NODE_RPU_0] },
    // IOU_SLCR
    MmioRegion { base: 0xFF18_0000, size: 0x1000, masters: &[NODE_APU, NODE_RPU_0, NODE_RPU_1] },
];

/// The built-in board topology
pub static TOPOLOGY: TopologyConfig = TopologyConfig {
    nodes: &NODES,
    masters: &MASTERS,
    mmio: &MMIO,
};
